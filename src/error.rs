//! Failure kinds and the error value that carries a rendered trace (spec §7).
//!
//! Modeled on `exception_private::ExcType` + `RunResult<T>`: the failure is a
//! plain value carrying a kind, a message, and the chain of trace frames that
//! were active when it was raised, rather than a panic. `Display` renders the
//! frames root-down followed by the final failure sentence, per spec §4.A.

use std::fmt;

use strum::{Display as StrumDisplay, EnumString};

use crate::trace::TraceFrameSnapshot;

/// The kind of failure, independent of the message text. See spec §7's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum FailureKind {
    NameNotFound,
    AccessOnExternal,
    DependencyCycle,
    ImportCycle,
    ImportNotFound,
    ConstructionError,
    CompositionTypeError,
    LambdaCallError,
    NotImplemented,
}

/// A failure produced anywhere in the engine.
///
/// `frames` is the trace-frame chain captured at the point of failure, root
/// first. `source` lets a failure wrap an earlier one (e.g. a failed import
/// wraps the inner document's construction error).
#[derive(Debug, Clone)]
pub struct YamletError {
    pub kind: FailureKind,
    pub message: String,
    pub frames: Vec<TraceFrameSnapshot>,
    pub source: Option<Box<YamletError>>,
}

pub type YamletResult<T> = Result<T, YamletError>;

impl YamletError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), frames: Vec::new(), source: None }
    }

    pub fn with_frames(mut self, frames: Vec<TraceFrameSnapshot>) -> Self {
        self.frames = frames;
        self
    }

    pub fn caused_by(mut self, source: YamletError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Number of non-blank lines `Display` would produce; used by tests
    /// checking the 15-30 line calibration requirement from spec §4.A.
    pub fn rendered_line_count(&self) -> usize {
        self.to_string().lines().filter(|l| !l.trim().is_empty()).count()
    }
}

impl fmt::Display for YamletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{} (at {})", frame.label, frame.point)?;
        }
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, "\ncaused by: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for YamletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
