//! Tuple (scope) storage (spec §3 "Tuple (scope)").
//!
//! The composition and cloning *algorithms* live on [`crate::engine::Engine`]
//! since they need arena-wide access (allocating new tuples, rewiring
//! deferred cells' scopes); this module only holds the per-tuple data
//! record.

use ahash::AHashSet;
use indexmap::IndexMap;
use std::rc::Rc;

use crate::{
    point::SourceSpan,
    value::{Cell, DeferredId, LadderId, TupleId},
};

/// Which contributing tuple produced the current state of a key, and how
/// (spec §3 "provenances", used by `explain_value`).
#[derive(Debug, Clone)]
pub struct Provenance {
    pub contributor: TupleId,
    pub action: ProvenanceAction,
}

#[derive(Debug, Clone)]
pub enum ProvenanceAction {
    Inserted,
    Overridden { previous_contributor: TupleId },
    Merged { with: TupleId },
    Nullified,
}

/// An ordered mapping from string keys to cells, plus the scope-graph edges
/// and bookkeeping described in spec §3.
#[derive(Debug, Clone)]
pub struct TupleData {
    pub parent: Option<TupleId>,
    pub super_: Option<TupleId>,
    /// Insertion-ordered; construction order or composition order, per
    /// spec §5 "Ordering".
    pub cells: IndexMap<Rc<str>, Cell>,
    /// Keys marked `!local`: resolvable, but excluded from enumeration.
    pub locals: AHashSet<Rc<str>>,
    /// Ladders inherited across composition, keyed by stable identity so an
    /// `IfLadderItem` can still find its ladder after cloning.
    pub preprocessors: IndexMap<LadderId, DeferredId>,
    pub provenances: IndexMap<Rc<str>, Provenance>,
    pub source: SourceSpan,
}

impl TupleData {
    pub fn new(source: SourceSpan) -> Self {
        Self {
            parent: None,
            super_: None,
            cells: IndexMap::new(),
            locals: AHashSet::new(),
            preprocessors: IndexMap::new(),
            provenances: IndexMap::new(),
            source,
        }
    }

    /// Whether `key` should be visible to enumeration (`len`, `items`,
    /// `in`): present, not null, not `!local`. Deferred cells that resolve
    /// to `undefined` are erased earlier, during preprocessing, so they
    /// never reach `cells` at all (see `crate::preprocess`).
    pub fn is_enumerable(&self, key: &str) -> bool {
        match self.cells.get(key) {
            Some(cell) => !cell.is_null() && !self.locals.contains(key),
            None => false,
        }
    }

    pub fn enumerable_keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().filter(move |k| self.is_enumerable(k)).map(Rc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.enumerable_keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
