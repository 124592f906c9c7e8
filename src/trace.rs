//! Trace-frame chain (spec §4.A).
//!
//! Evaluation runs under a stack of frames recording what is being evaluated
//! and where it came from in the source. The stack is consulted two ways:
//! rendered root-down into every [`YamletError`](crate::error::YamletError),
//! and scanned for a re-entrant [`DeferredId`] to detect dependency cycles
//! (spec §4.I).
//!
//! Frames live on an explicit `Vec` owned by [`Trace`] rather than as an
//! `Rc`-linked tree: nothing outlives the call that pushed it, so a plain
//! stack with RAII pop guards is the simpler fit.

use crate::{
    point::SourceSpan,
    value::ids::{DeferredId, TupleId},
};

/// What distinguishes a frame beyond its label and span.
#[derive(Debug, Clone)]
pub(crate) enum FrameKind {
    Generic,
    NameResolution { key: std::rc::Rc<str> },
    DeferredEval { deferred: DeferredId },
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub label: String,
    pub point: SourceSpan,
    pub scope: TupleId,
    pub kind: FrameKind,
}

/// A snapshot of one frame, detached from the live stack, suitable for
/// embedding in a [`YamletError`](crate::error::YamletError) after the stack
/// has unwound.
#[derive(Debug, Clone)]
pub struct TraceFrameSnapshot {
    pub label: String,
    pub point: SourceSpan,
}

/// RAII guard returned by [`Trace::branch`] and friends; pops its frame when
/// dropped, regardless of whether the branch succeeded.
pub(crate) struct FrameGuard<'a> {
    trace: &'a mut Trace,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.trace.stack.pop();
    }
}

impl std::ops::Deref for FrameGuard<'_> {
    type Target = Trace;
    fn deref(&self) -> &Trace {
        self.trace
    }
}

impl std::ops::DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Trace {
        self.trace
    }
}

/// The live trace-frame stack threaded through one top-level evaluation.
#[derive(Debug, Default)]
pub(crate) struct Trace {
    stack: Vec<Frame>,
}

impl Trace {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Push a generic child frame ("Evaluating expression `…`", etc.).
    pub fn branch(&mut self, label: impl Into<String>, point: SourceSpan, scope: TupleId) -> FrameGuard<'_> {
        self.stack.push(Frame { label: label.into(), point, scope, kind: FrameKind::Generic });
        FrameGuard { trace: self }
    }

    /// Push a child frame keyed under `key`, used while resolving a name.
    pub fn branch_for_name_resolution(
        &mut self,
        desc: impl Into<String>,
        key: std::rc::Rc<str>,
        point: SourceSpan,
        scope: TupleId,
    ) -> FrameGuard<'_> {
        self.stack.push(Frame { label: desc.into(), point, scope, kind: FrameKind::NameResolution { key } });
        FrameGuard { trace: self }
    }

    /// Push a frame marking `deferred` as currently evaluating. Fails with a
    /// dependency-cycle error if any ancestor frame already marks the same
    /// deferred identity (spec §4.I).
    pub fn branch_for_deferred_eval(
        &mut self,
        deferred: DeferredId,
        desc: impl Into<String>,
        point: SourceSpan,
        scope: TupleId,
    ) -> Result<FrameGuard<'_>, ()> {
        let already_evaluating = self.stack.iter().any(|frame| {
            matches!(frame.kind, FrameKind::DeferredEval { deferred: d } if d == deferred)
        });
        if already_evaluating {
            return Err(());
        }
        self.stack.push(Frame { label: desc.into(), point, scope, kind: FrameKind::DeferredEval { deferred } });
        Ok(FrameGuard { trace: self })
    }

    /// Detached, root-first snapshot of the current stack, for embedding in
    /// a [`YamletError`](crate::error::YamletError) at the point of failure.
    pub fn snapshot(&self) -> Vec<TraceFrameSnapshot> {
        self.stack
            .iter()
            .map(|f| TraceFrameSnapshot { label: f.label.clone(), point: f.point.clone() })
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
