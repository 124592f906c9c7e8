//! The arena-wide operations: tuple/deferred/lambda/ladder storage,
//! composition and cloning (spec §4.G), and the deferred-value cache and
//! recursion guard (spec §4.I).
//!
//! Kept as one `Engine` struct rather than spreading arena ownership across
//! the tuple/deferred types themselves, the way `namespace.rs`'s
//! `Namespaces` is the single owner of every scope's storage in ouros.

use std::rc::Rc;

use slotmap::{SecondaryMap, SlotMap};

use crate::{
    construct,
    error::{FailureKind, YamletError, YamletResult},
    expr,
    import::{ImportResolver, ImportSource, ModuleCache},
    ladder::Ladder,
    lambda::LambdaDef,
    options::Options,
    point::SourceSpan,
    preprocess,
    trace::Trace,
    value::{
        cache::CacheSlot, compositable::HostValue, deferred::DeferredKind, tuple::{Provenance, ProvenanceAction, TupleData},
        Cell, DeferredId, LadderId, LambdaId, Sentinel, TupleId, Value,
    },
    yaml::{self, RawNode},
};

/// Owns every arena (tuples, deferred cells, lambdas, ladders), the runtime
/// options, the import resolver, and the loader-owned module cache. One
/// `Engine` per `load`/`load_file` call (spec §5 "Process-wide import cache"
/// — scoped to one loader instance, not a process global).
pub struct Engine {
    tuples: SlotMap<TupleId, TupleData>,
    deferred: SlotMap<DeferredId, DeferredCellStore>,
    lambdas: SlotMap<LambdaId, LambdaDef>,
    ladders: SlotMap<LadderId, Ladder>,
    pub(crate) options: Options,
    pub(crate) modules: ModuleCache,
    resolver: Box<dyn ImportResolver>,
    /// Names visible only while resolving inside an imported module, keyed by
    /// that module's root tuple (spec §4.B "ImportLoad").
    module_globals: SecondaryMap<TupleId, indexmap::IndexMap<Rc<str>, Value>>,
    /// The importing scope's own module root, for the cross-module fallback
    /// chain described in spec §4.F.
    module_parent: SecondaryMap<TupleId, TupleId>,
}

use crate::value::deferred::DeferredCell as DeferredCellStore;

impl Engine {
    pub fn new(options: Options, resolver: Box<dyn ImportResolver>) -> Self {
        Self {
            tuples: SlotMap::with_key(),
            deferred: SlotMap::with_key(),
            lambdas: SlotMap::with_key(),
            ladders: SlotMap::with_key(),
            options,
            modules: ModuleCache::new(),
            resolver,
            module_globals: SecondaryMap::new(),
            module_parent: SecondaryMap::new(),
        }
    }

    // --- arena accessors -------------------------------------------------

    pub(crate) fn alloc_tuple(&mut self, data: TupleData) -> TupleId {
        self.tuples.insert(data)
    }

    pub(crate) fn alloc_deferred(&mut self, cell: DeferredCellStore) -> DeferredId {
        self.deferred.insert(cell)
    }

    pub(crate) fn alloc_lambda(&mut self, def: LambdaDef) -> LambdaId {
        self.lambdas.insert(def)
    }

    pub(crate) fn alloc_ladder(&mut self, ladder: Ladder) -> LadderId {
        self.ladders.insert(ladder)
    }

    pub(crate) fn tuple(&self, id: TupleId) -> &TupleData {
        &self.tuples[id]
    }

    pub(crate) fn tuple_mut(&mut self, id: TupleId) -> &mut TupleData {
        &mut self.tuples[id]
    }

    pub(crate) fn deferred(&self, id: DeferredId) -> &DeferredCellStore {
        &self.deferred[id]
    }

    pub(crate) fn ladder(&self, id: LadderId) -> &Ladder {
        &self.ladders[id]
    }

    pub(crate) fn lambda(&self, id: LambdaId) -> &LambdaDef {
        &self.lambdas[id]
    }

    pub(crate) fn options(&self) -> &Options {
        &self.options
    }

    // --- loading -----------------------------------------------------

    /// Parses and constructs a document from source text, returning its root
    /// tuple. Used by the public facade and by `ImportLoad` for raw-bytes
    /// import results.
    pub(crate) fn load_document(&mut self, text: &str, file: Rc<str>) -> YamletResult<TupleId> {
        let raw = yaml::parse_document(text)?;
        construct::build_document(self, &raw, file)
    }

    /// Resolves an `!import` request to the imported module's root tuple,
    /// consulting and updating the module cache (spec §4.B "ImportLoad", §5
    /// "Shared-resource policy").
    pub(crate) fn load_import(
        &mut self,
        trace: &mut Trace,
        requested: &str,
        importing_scope: TupleId,
    ) -> YamletResult<TupleId> {
        let from_dir = self.options.root_dir.clone();
        let info = self
            .resolver
            .resolve(requested, from_dir.as_deref())
            .map_err(|e| e.with_frames(trace.snapshot()))?;
        if let Some(cached) = self.modules.get(&info.canonical_key) {
            return Ok(cached);
        }
        self.modules.begin_loading(&info.canonical_key)?;
        let file: Rc<str> = Rc::from(info.canonical_key.as_str());
        let root = match info.source {
            ImportSource::Bytes(text) => self.load_document(&text, file)?,
            ImportSource::Tree(raw) => construct::build_document(self, &raw, file)?,
        };
        self.module_globals.insert(root, info.module_globals);
        if let Some(importer_root) = self.module_root_of(importing_scope) {
            self.module_parent.insert(root, importer_root);
        }
        self.modules.finish_loading(&info.canonical_key, root);
        Ok(root)
    }

    /// Walks `scope`'s `parent` chain to the tuple with no parent (the
    /// module root it belongs to).
    pub(crate) fn module_root_of(&self, scope: TupleId) -> Option<TupleId> {
        let mut current = scope;
        loop {
            match self.tuples[current].parent {
                Some(p) => current = p,
                None => return Some(current),
            }
        }
    }

    pub(crate) fn module_globals_of(&self, module_root: TupleId) -> Option<&indexmap::IndexMap<Rc<str>, Value>> {
        self.module_globals.get(module_root)
    }

    pub(crate) fn module_parent_of(&self, module_root: TupleId) -> Option<TupleId> {
        self.module_parent.get(module_root).copied()
    }

    // --- cell forcing ------------------------------------------------

    /// Forces a cell to a concrete value, dispatching sentinels. `null`
    /// raises here (this is the direct-access path); name resolution treats
    /// `null` specially *before* calling this (spec §4.F step 2).
    pub(crate) fn force_cell(&mut self, trace: &mut Trace, cell: &Cell) -> YamletResult<Value> {
        match cell {
            Cell::Value(v) => Ok(v.clone()),
            Cell::Sentinel(Sentinel::Null) => Err(YamletError::new(
                FailureKind::NameNotFound,
                "name resolves to the null sentinel".to_owned(),
            )
            .with_frames(trace.snapshot())),
            Cell::Sentinel(Sentinel::External) => Err(YamletError::new(
                FailureKind::AccessOnExternal,
                "external in this scope".to_owned(),
            )
            .with_frames(trace.snapshot())),
            Cell::Sentinel(Sentinel::Undefined) => Err(YamletError::new(
                FailureKind::ConstructionError,
                "internal invariant violation: undefined sentinel reached by lookup".to_owned(),
            )
            .with_frames(trace.snapshot())),
            Cell::Sentinel(Sentinel::Empty) => unreachable!("empty sentinel never escapes the cache"),
            Cell::Deferred(id) => self.resolve_deferred(trace, *id),
        }
    }

    /// Looks a key up directly on `tuple` (the public `get`/attribute-access
    /// entry point): `null` raises *name not found*, `external` raises
    /// *access on external*, anything else is forced (spec §8 boundary
    /// behaviors).
    pub(crate) fn get_key(&mut self, trace: &mut Trace, tuple: TupleId, key: &str) -> YamletResult<Value> {
        let cell = self
            .tuples
            .get(tuple)
            .and_then(|t| t.cells.get(key).cloned())
            .ok_or_else(|| {
                YamletError::new(FailureKind::NameNotFound, format!("no variable called `{key}`"))
                    .with_frames(trace.snapshot())
            })?;
        self.force_cell(trace, &cell)
    }

    // --- deferred resolution / recursion guard (spec §4.I) ------------

    pub(crate) fn resolve_deferred(&mut self, trace: &mut Trace, id: DeferredId) -> YamletResult<Value> {
        if let Some(v) = self.deferred[id].cache.get().cloned() {
            if self.options.caching != crate::value::cache::CachePolicy::Debug {
                return Ok(v);
            }
        }
        let scope = self.deferred[id].scope;
        let point = self.deferred[id].point.clone();
        let desc = self.deferred[id].kind.describe();
        let mut guard = match trace.branch_for_deferred_eval(id, format!("resolving: {desc}"), point, scope) {
            Ok(g) => g,
            Err(()) => {
                return Err(YamletError::new(FailureKind::DependencyCycle, "dependency cycle detected".to_owned())
                    .with_frames(trace.snapshot()));
            }
        };
        let fresh = self.eval_deferred_kind(&mut guard, id)?;
        drop(guard);
        match self.options.caching {
            crate::value::cache::CachePolicy::Values => {
                self.deferred[id].cache = CacheSlot::Populated(fresh.clone());
            }
            crate::value::cache::CachePolicy::Nothing => {}
            crate::value::cache::CachePolicy::Debug => {
                if let Some(prev) = self.deferred[id].cache.get() {
                    if !crate::value::values_structurally_equal(prev, &fresh) {
                        return Err(YamletError::new(
                            FailureKind::ConstructionError,
                            "CACHE_DEBUG: recomputation produced a different value".to_owned(),
                        )
                        .with_frames(trace.snapshot()));
                    }
                } else {
                    self.deferred[id].cache = CacheSlot::Populated(fresh.clone());
                }
            }
        }
        Ok(fresh)
    }

    fn eval_deferred_kind(&mut self, trace: &mut Trace, id: DeferredId) -> YamletResult<Value> {
        let scope = self.deferred[id].scope;
        let point = self.deferred[id].point.clone();
        let kind = self.deferred[id].kind.clone();
        match kind {
            DeferredKind::ImportLoad { text } => {
                let filename = expr::interpolate(self, trace, &text, scope, point)?;
                let root = self.load_import(trace, &filename, scope)?;
                Ok(Value::Tuple(root))
            }
            DeferredKind::StringInterpolate { text } => {
                let s = expr::interpolate(self, trace, &text, scope, point)?;
                Ok(Value::Str(Rc::from(s)))
            }
            DeferredKind::ExpressionEvaluate { text } => expr::eval_text(self, trace, &text, scope, point),
            DeferredKind::TupleListComposite { items } => {
                let mut tuple_ids = Vec::with_capacity(items.len());
                for item in &items {
                    tuple_ids.push(self.composite_item_to_tuple(trace, item, scope, point.clone())?);
                }
                if tuple_ids.is_empty() {
                    return Err(YamletError::new(
                        FailureKind::ConstructionError,
                        "!composite with no items".to_owned(),
                    )
                    .with_frames(trace.snapshot()));
                }
                let result = self.composite(trace, &tuple_ids, scope, point)?;
                Ok(Value::Tuple(result))
            }
            DeferredKind::IfLadderIndex { ladder } => {
                let idx = self.evaluate_ladder_index(trace, ladder, scope, point)?;
                Ok(Value::Int(idx))
            }
            DeferredKind::IfLadderItem { ladder, branches } => {
                let index_deferred = self.index_deferred_for(scope, ladder);
                let idx = match self.resolve_deferred(trace, index_deferred)? {
                    Value::Int(i) => i,
                    _ => unreachable!("IfLadderIndex always resolves to an int"),
                };
                if idx < 0 {
                    return Ok(Value::Sentinel(Sentinel::Undefined));
                }
                let branch = branches.get(idx as usize).cloned().unwrap_or(Cell::undefined());
                self.force_cell_allow_undefined(trace, &branch)
            }
            DeferredKind::FlatCompositor { terms, var_name: _ } => self.resolve_flat_compositor(trace, &terms, scope, point),
            DeferredKind::Lambda { params, body } => {
                let lambda_id = self.alloc_lambda(LambdaDef { params, body, closure: scope, point });
                Ok(Value::Lambda(lambda_id))
            }
            DeferredKind::PreprocessingTuple { tuple } => {
                preprocess::run_erasure(self, trace, tuple)?;
                Ok(Value::Tuple(tuple))
            }
        }
    }

    /// Like `force_cell`, but lets the `undefined` sentinel through instead
    /// of erroring, for use inside `FlatCompositor`/`IfLadderItem`
    /// resolution which both need to observe it.
    fn force_cell_allow_undefined(&mut self, trace: &mut Trace, cell: &Cell) -> YamletResult<Value> {
        if matches!(cell, Cell::Sentinel(Sentinel::Undefined)) {
            return Ok(Value::Sentinel(Sentinel::Undefined));
        }
        self.force_cell(trace, cell)
    }

    fn resolve_flat_compositor(
        &mut self,
        trace: &mut Trace,
        terms: &[Cell],
        scope: TupleId,
        point: SourceSpan,
    ) -> YamletResult<Value> {
        let mut remaining = Vec::new();
        for term in terms {
            let v = self.force_cell_allow_undefined(trace, term)?;
            if matches!(v, Value::Sentinel(Sentinel::Undefined)) {
                continue;
            }
            if matches!(v, Value::Sentinel(Sentinel::External)) {
                return Err(YamletError::new(
                    FailureKind::AccessOnExternal,
                    "external in this scope".to_owned(),
                )
                .with_frames(trace.snapshot()));
            }
            remaining.push(v);
        }
        match remaining.len() {
            0 => Ok(Value::Sentinel(Sentinel::Undefined)),
            1 => Ok(remaining.into_iter().next().unwrap()),
            _ => {
                let all_compositable = remaining.iter().all(|v| matches!(v, Value::Tuple(_) | Value::Host(_)));
                let any_compositable = remaining.iter().any(|v| matches!(v, Value::Tuple(_) | Value::Host(_)));
                if any_compositable && !all_compositable {
                    return Err(YamletError::new(
                        FailureKind::CompositionTypeError,
                        "mixing compositable and non-compositable values under the same key".to_owned(),
                    )
                    .with_frames(trace.snapshot()));
                }
                if !all_compositable {
                    return Ok(remaining.into_iter().last().unwrap());
                }
                if remaining.iter().all(|v| matches!(v, Value::Tuple(_))) {
                    let ids: Vec<TupleId> = remaining.iter().map(|v| v.as_tuple().unwrap()).collect();
                    let result = self.composite(trace, &ids, scope, point)?;
                    Ok(Value::Tuple(result))
                } else {
                    let mut iter = remaining.into_iter();
                    let mut acc = iter.next().unwrap();
                    for next in iter {
                        acc = match (acc, next) {
                            (Value::Host(a), Value::Host(b)) => Value::Host(Rc::from(a.yamlet_merge(b.as_ref())?)),
                            _ => {
                                return Err(YamletError::new(
                                    FailureKind::CompositionTypeError,
                                    "mixing compositable and non-compositable values under the same key".to_owned(),
                                )
                                .with_frames(trace.snapshot()));
                            }
                        };
                    }
                    Ok(acc)
                }
            }
        }
    }

    fn composite_item_to_tuple(
        &mut self,
        trace: &mut Trace,
        item: &crate::value::deferred::CompositeItem,
        scope: TupleId,
        _point: SourceSpan,
    ) -> YamletResult<TupleId> {
        use crate::value::deferred::CompositeItem;
        match item {
            CompositeItem::Name(name) => {
                let v = crate::resolve::resolve_name(self, trace, scope, name, true)?;
                v.as_tuple().ok_or_else(|| {
                    YamletError::new(FailureKind::CompositionTypeError, format!("`{name}` is not a tuple"))
                        .with_frames(trace.snapshot())
                })
            }
            CompositeItem::Inline(id) => Ok(*id),
            CompositeItem::Nested(cell) => {
                let v = self.force_cell(trace, cell)?;
                v.as_tuple().ok_or_else(|| {
                    YamletError::new(FailureKind::CompositionTypeError, "composite item is not a tuple".to_owned())
                        .with_frames(trace.snapshot())
                })
            }
        }
    }

    // --- if-ladder index -------------------------------------------------

    /// Finds (or lazily creates) the `IfLadderIndex` deferred `scope` uses to
    /// resolve `ladder`, per the per-tuple `preprocessors` map (spec §4.G
    /// step 3's "rebind internal deferreds, same ladder identity").
    pub(crate) fn index_deferred_for(&mut self, scope: TupleId, ladder: LadderId) -> DeferredId {
        if let Some(id) = self.tuples[scope].preprocessors.get(&ladder) {
            return *id;
        }
        let point = self.tuples[scope].source.clone();
        let id = self.alloc_deferred(DeferredCellStore::new(DeferredKind::IfLadderIndex { ladder }, scope, point));
        self.tuples[scope].preprocessors.insert(ladder, id);
        id
    }

    fn evaluate_ladder_index(
        &mut self,
        trace: &mut Trace,
        ladder_id: LadderId,
        scope: TupleId,
        point: SourceSpan,
    ) -> YamletResult<i64> {
        let ladder = self.ladders[ladder_id].clone();
        for (i, arm) in ladder.arms.iter().enumerate() {
            let Some(cond) = &arm.condition else {
                return Ok(i as i64);
            };
            let v = expr::eval_text(self, trace, cond, scope, arm.point.clone())?;
            if v.is_truthy() {
                return Ok(i as i64);
            }
        }
        let _ = point;
        Ok(ladder.else_index().map(|i| i as i64).unwrap_or(-1))
    }

    pub(crate) fn is_undefined(&mut self, trace: &mut Trace, id: DeferredId) -> YamletResult<bool> {
        let kind = self.deferred[id].kind.clone();
        match kind {
            DeferredKind::IfLadderItem { ladder, branches } => {
                let scope = self.deferred[id].scope;
                let index_deferred = self.index_deferred_for(scope, ladder);
                match self.resolve_deferred(trace, index_deferred) {
                    Ok(Value::Int(idx)) => {
                        if idx < 0 {
                            return Ok(true);
                        }
                        Ok(matches!(branches.get(idx as usize), Some(Cell::Sentinel(Sentinel::Undefined)) | None))
                    }
                    _ => Ok(false),
                }
            }
            DeferredKind::FlatCompositor { terms, .. } => {
                for t in &terms {
                    let undefined = match t {
                        Cell::Sentinel(Sentinel::Undefined) => true,
                        Cell::Deferred(tid) => self.is_undefined(trace, *tid).unwrap_or(false),
                        _ => false,
                    };
                    if !undefined {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // --- cloning (spec §4.G cloning contract) -----------------------------

    pub(crate) fn clone_tuple(&mut self, id: TupleId, new_scope: TupleId) -> TupleId {
        let original = self.tuples[id].clone();
        let new_id = self.alloc_tuple(TupleData::new(original.source.clone()));
        self.tuples[new_id].parent = Some(new_scope);
        self.tuples[new_id].super_ = Some(id);
        self.tuples[new_id].locals = original.locals.clone();
        for (k, cell) in original.cells.iter() {
            let cloned = self.clone_cell(cell, new_id);
            self.tuples[new_id].cells.insert(k.clone(), cloned);
        }
        for (ladder_id, index_deferred) in original.preprocessors.iter() {
            let cloned_index = self.clone_deferred(*index_deferred, new_id);
            self.tuples[new_id].preprocessors.insert(*ladder_id, cloned_index);
        }
        self.tuples[new_id].provenances = original.provenances.clone();
        new_id
    }

    fn clone_cell(&mut self, cell: &Cell, new_scope: TupleId) -> Cell {
        match cell {
            Cell::Value(Value::Tuple(id)) => Cell::Value(Value::Tuple(self.clone_tuple(*id, new_scope))),
            Cell::Value(Value::Host(h)) => Cell::Value(Value::Host(Rc::from(h.yamlet_clone()))),
            Cell::Value(other) => Cell::Value(other.clone()),
            Cell::Deferred(id) => Cell::Deferred(self.clone_deferred(*id, new_scope)),
            Cell::Sentinel(s) => Cell::Sentinel(*s),
        }
    }

    fn clone_deferred(&mut self, id: DeferredId, new_scope: TupleId) -> DeferredId {
        use crate::value::deferred::CompositeItem;
        let original = self.deferred[id].clone();
        let new_kind = match original.kind {
            DeferredKind::ImportLoad { text } => DeferredKind::ImportLoad { text },
            DeferredKind::StringInterpolate { text } => DeferredKind::StringInterpolate { text },
            DeferredKind::ExpressionEvaluate { text } => DeferredKind::ExpressionEvaluate { text },
            DeferredKind::Lambda { params, body } => DeferredKind::Lambda { params, body },
            DeferredKind::PreprocessingTuple { tuple } => {
                DeferredKind::PreprocessingTuple { tuple: self.clone_tuple(tuple, new_scope) }
            }
            DeferredKind::TupleListComposite { items } => DeferredKind::TupleListComposite {
                items: items
                    .into_iter()
                    .map(|item| match item {
                        CompositeItem::Name(n) => CompositeItem::Name(n),
                        CompositeItem::Inline(t) => CompositeItem::Inline(self.clone_tuple(t, new_scope)),
                        CompositeItem::Nested(cell) => CompositeItem::Nested(Box::new(self.clone_cell(&cell, new_scope))),
                    })
                    .collect(),
            },
            DeferredKind::IfLadderIndex { ladder } => DeferredKind::IfLadderIndex { ladder },
            DeferredKind::IfLadderItem { ladder, branches } => DeferredKind::IfLadderItem {
                ladder,
                branches: branches.iter().map(|c| self.clone_cell(c, new_scope)).collect(),
            },
            DeferredKind::FlatCompositor { terms, var_name } => DeferredKind::FlatCompositor {
                terms: terms.iter().map(|c| self.clone_cell(c, new_scope)).collect(),
                var_name,
            },
        };
        self.alloc_deferred(DeferredCellStore::new(new_kind, new_scope, original.point))
    }

    /// Forces any `PreprocessingTuple` wrapper off a value, returning the
    /// bare tuple id underneath (spec §3 "PreprocessingTuple" marker).
    pub(crate) fn force_to_tuple(&mut self, trace: &mut Trace, cell: &Cell) -> YamletResult<TupleId> {
        let v = self.force_cell(trace, cell)?;
        v.as_tuple().ok_or_else(|| {
            YamletError::new(FailureKind::CompositionTypeError, "value is not a tuple".to_owned())
                .with_frames(trace.snapshot())
        })
    }

    // --- composition (spec §4.G) ------------------------------------------

    /// `composite([t1, t2, ...])`: produces a new tuple, later tuples
    /// overriding earlier ones, rewired so `result.parent == caller_scope`.
    pub(crate) fn composite(
        &mut self,
        trace: &mut Trace,
        items: &[TupleId],
        caller_scope: TupleId,
        point: SourceSpan,
    ) -> YamletResult<TupleId> {
        let mut iter = items.iter();
        let first = *iter.next().expect("composite requires at least one tuple");
        let result = self.clone_tuple(first, caller_scope);
        for &next in iter {
            let next_clone = self.clone_tuple(next, caller_scope);
            self.merge_one(trace, result, next_clone, point.clone())?;
        }
        preprocess::run_erasure(self, trace, result)?;
        Ok(result)
    }

    fn is_compositable_pair(&self, a: &Cell, b: &Cell) -> bool {
        matches!(
            (a, b),
            (Cell::Value(Value::Tuple(_)), Cell::Value(Value::Tuple(_)))
                | (Cell::Value(Value::Host(_)), Cell::Value(Value::Host(_)))
        )
    }

    /// Forces a `PreprocessingTuple` wrapper (the lazy form ordinary nested
    /// mappings are constructed as, so ladder conditions aren't evaluated
    /// until something actually needs the tuple) down to a bare
    /// `Cell::Value(Value::Tuple(_))` so the compositability check above can
    /// see the shape underneath. Any other cell passes through unchanged.
    fn normalize_for_composition(&mut self, trace: &mut Trace, cell: &Cell) -> YamletResult<Cell> {
        if let Cell::Deferred(id) = cell {
            if matches!(self.deferred[*id].kind, DeferredKind::PreprocessingTuple { .. }) {
                let v = self.resolve_deferred(trace, *id)?;
                return Ok(Cell::Value(v));
            }
        }
        Ok(cell.clone())
    }

    fn merge_cells(
        &mut self,
        trace: &mut Trace,
        a: &Cell,
        b: &Cell,
        scope: TupleId,
        point: SourceSpan,
    ) -> YamletResult<Cell> {
        match (a, b) {
            (Cell::Value(Value::Tuple(ta)), Cell::Value(Value::Tuple(tb))) => {
                let merged = self.composite(trace, &[*ta, *tb], scope, point)?;
                Ok(Cell::Value(Value::Tuple(merged)))
            }
            (Cell::Value(Value::Host(ha)), Cell::Value(Value::Host(hb))) => {
                let merged = ha.yamlet_merge(hb.as_ref())?;
                Ok(Cell::Value(Value::Host(Rc::from(merged))))
            }
            _ => unreachable!("is_compositable_pair guards every call site"),
        }
    }

    /// Merges `contributor` (already cloned, owning its own identity) into
    /// `result` in place — spec §4.G step 2.
    fn merge_one(
        &mut self,
        trace: &mut Trace,
        result: TupleId,
        contributor: TupleId,
        point: SourceSpan,
    ) -> YamletResult<()> {
        let contributor_cells: Vec<(Rc<str>, Cell)> =
            self.tuples[contributor].cells.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let contributor_locals = self.tuples[contributor].locals.clone();
        for (key, v_i) in contributor_cells {
            if self.tuples[contributor].locals.contains(&key) {
                self.tuples[result].locals.insert(key.clone());
            }
            match &v_i {
                Cell::Sentinel(Sentinel::Null) => {
                    self.tuples[result].cells.shift_remove(&key);
                    self.tuples[result]
                        .provenances
                        .insert(key.clone(), Provenance { contributor, action: ProvenanceAction::Nullified });
                }
                Cell::Sentinel(Sentinel::External) => {
                    if !self.tuples[result].cells.contains_key(&key) {
                        self.tuples[result].cells.insert(key.clone(), Cell::Sentinel(Sentinel::External));
                        self.tuples[result]
                            .provenances
                            .insert(key.clone(), Provenance { contributor, action: ProvenanceAction::Inserted });
                    }
                }
                Cell::Sentinel(Sentinel::Undefined) => {
                    return Err(YamletError::new(
                        FailureKind::ConstructionError,
                        "internal invariant violation: undefined sentinel reached composition".to_owned(),
                    )
                    .with_frames(trace.snapshot()));
                }
                _ => {
                    let existing = self.tuples[result].cells.get(&key).cloned();
                    match existing {
                        None => {
                            let cloned = self.clone_cell(&v_i, result);
                            self.tuples[result].cells.insert(key.clone(), cloned);
                            self.tuples[result]
                                .provenances
                                .insert(key.clone(), Provenance { contributor, action: ProvenanceAction::Inserted });
                        }
                        Some(existing_cell) => {
                            let existing_norm = self.normalize_for_composition(trace, &existing_cell)?;
                            let v_i_norm = self.normalize_for_composition(trace, &v_i)?;
                            if self.is_compositable_pair(&existing_norm, &v_i_norm) {
                                let merged = self.merge_cells(trace, &existing_norm, &v_i_norm, result, point.clone())?;
                                self.tuples[result].cells.insert(key.clone(), merged);
                                self.tuples[result].provenances.insert(
                                    key.clone(),
                                    Provenance { contributor, action: ProvenanceAction::Merged { with: contributor } },
                                );
                            } else {
                                let cloned = self.clone_cell(&v_i, result);
                                self.tuples[result].cells.insert(key.clone(), cloned);
                                self.tuples[result].provenances.insert(
                                    key.clone(),
                                    Provenance { contributor, action: ProvenanceAction::Overridden { previous_contributor: result } },
                                );
                            }
                        }
                    }
                }
            }
        }
        let _ = contributor_locals;
        let ladders: Vec<LadderId> = self.tuples[contributor].preprocessors.keys().copied().collect();
        for ladder_id in ladders {
            if !self.tuples[result].preprocessors.contains_key(&ladder_id) {
                let contributor_index = self.tuples[contributor].preprocessors[&ladder_id];
                let cloned_index = self.clone_deferred(contributor_index, result);
                self.tuples[result].preprocessors.insert(ladder_id, cloned_index);
            }
        }
        Ok(())
    }

    // --- evaluate_fully / explain_value (spec §4.I, §10) ---------------------

    pub(crate) fn evaluate_fully(&mut self, trace: &mut Trace, tuple: TupleId) -> YamletResult<Value> {
        let keys: Vec<Rc<str>> = self.tuples[tuple].enumerable_keys().map(Rc::from).collect();
        let mut map = indexmap::IndexMap::new();
        for key in keys {
            let v = self.get_key(trace, tuple, &key)?;
            let flattened = self.flatten_value(trace, v)?;
            map.insert(crate::value::MapKey::Str(key), flattened);
        }
        Ok(Value::HostMap(Rc::new(map)))
    }

    fn flatten_value(&mut self, trace: &mut Trace, v: Value) -> YamletResult<Value> {
        match v {
            Value::Tuple(id) => self.evaluate_fully(trace, id),
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(self.flatten_value(trace, item.clone())?);
                }
                Ok(Value::Sequence(Rc::new(out)))
            }
            other => Ok(other),
        }
    }

    pub(crate) fn explain_value(&mut self, tuple: TupleId, key: &str) -> String {
        match self.tuples[tuple].provenances.get(key) {
            Some(p) => {
                let contributor = p.contributor;
                match &p.action {
                    ProvenanceAction::Inserted => {
                        format!("`{key}` inserted at {}", self.tuples[contributor].source)
                    }
                    ProvenanceAction::Overridden { .. } => {
                        format!("`{key}` overridden by a contributor at {}", self.tuples[contributor].source)
                    }
                    ProvenanceAction::Merged { .. } => {
                        format!("`{key}` merged from a contributor at {}", self.tuples[contributor].source)
                    }
                    ProvenanceAction::Nullified => {
                        format!("`{key}` nullified by a contributor at {}", self.tuples[contributor].source)
                    }
                }
            }
            None => format!("`{key}` has no recorded provenance (present since construction)"),
        }
    }
}
