//! Deferred-value kinds (spec §3, §4.B, §4.H).
//!
//! Modeled as a tagged union rather than a trait-object hierarchy per the
//! design note in spec §9: `resolve`/`is_undefined`/`clone` are implemented
//! as free functions matching on [`DeferredKind`] (see
//! `crate::engine::resolve_deferred` and `crate::engine::clone_deferred`)
//! instead of virtual dispatch.

use std::rc::Rc;

use crate::{
    lambda::ParamList,
    point::SourceSpan,
    value::{cache::CacheSlot, Cell, LadderId, TupleId},
};

/// One item of a `!composite` list: a bare name, an inline tuple literal, or
/// a nested deferred value (e.g. another tagged scalar appearing in the
/// sequence form).
#[derive(Debug, Clone)]
pub enum CompositeItem {
    Name(Rc<str>),
    Inline(TupleId),
    Nested(Box<Cell>),
}

#[derive(Debug, Clone)]
pub enum DeferredKind {
    ImportLoad { text: Rc<str> },
    StringInterpolate { text: Rc<str> },
    TupleListComposite { items: Vec<CompositeItem> },
    ExpressionEvaluate { text: Rc<str> },
    IfLadderIndex { ladder: LadderId },
    IfLadderItem { ladder: LadderId, branches: Vec<Cell> },
    FlatCompositor { terms: Vec<Cell>, var_name: Rc<str> },
    Lambda { params: ParamList, body: Rc<str> },
    /// A tuple that still has preprocessors to run before first use (spec
    /// §3's "PreprocessingTuple" marker).
    PreprocessingTuple { tuple: TupleId },
}

impl DeferredKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::ImportLoad { .. } => "importing",
            Self::StringInterpolate { .. } => "interpolating string",
            Self::TupleListComposite { .. } => "compositing `!composite` list",
            Self::ExpressionEvaluate { .. } => "evaluating expression",
            Self::IfLadderIndex { .. } => "selecting if-ladder arm",
            Self::IfLadderItem { .. } => "resolving if-ladder value",
            Self::FlatCompositor { .. } => "compositing overridden key",
            Self::Lambda { .. } => "defining lambda",
            Self::PreprocessingTuple { .. } => "preprocessing tuple",
        }
    }
}

/// A deferred cell: a kind, the scope names inside it resolve against, and a
/// cache slot (spec §3 "Deferred value state").
#[derive(Debug, Clone)]
pub struct DeferredCell {
    pub kind: DeferredKind,
    pub scope: TupleId,
    pub cache: CacheSlot,
    pub point: SourceSpan,
}

impl DeferredCell {
    pub fn new(kind: DeferredKind, scope: TupleId, point: SourceSpan) -> Self {
        Self { kind, scope, cache: CacheSlot::Empty, point }
    }
}
