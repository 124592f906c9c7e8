//! The YAML tree producer (spec §1, §6): explicitly out of the engine's core
//! scope, but the `load`/`load_file` facade needs a concrete implementation.
//!
//! The engine (`crate::construct`) only ever consumes [`RawNode`] — the
//! `{kind, tag, start, end}` contract spec §6 describes. This module is the
//! one place that contract is implemented against a real parser
//! (`yaml-rust2`'s event-based `Parser`), so a different YAML backend could
//! be swapped in without touching anything downstream of [`RawNode`].

mod source;

pub use source::parse_document;

use crate::point::SourcePoint;

#[derive(Debug, Clone)]
pub enum RawKind {
    Scalar(String),
    Sequence(Vec<RawNode>),
    /// Key/value pairs in document order; a mapping's key node carries the
    /// directive tags (`!if`, `!elif`, `!else`, `!local`) the preprocessor
    /// looks for (spec §4.H).
    Mapping(Vec<(RawNode, RawNode)>),
}

/// One node of the pre-parsed tree: kind, tag, and source range (spec §6).
#[derive(Debug, Clone)]
pub struct RawNode {
    pub kind: RawKind,
    /// The full tag text (e.g. `"!import"`, `"!!str"`), or `None` for an
    /// untagged node.
    pub tag: Option<String>,
    pub start: SourcePoint,
    pub end: SourcePoint,
}

impl RawNode {
    pub fn scalar(text: impl Into<String>, tag: Option<String>, start: SourcePoint, end: SourcePoint) -> Self {
        Self { kind: RawKind::Scalar(text.into()), tag, start, end }
    }
}
