//! Arena key types (spec §9: "represent tuples in an arena with stable
//! indices"). Grounded on `dolysis-yary`'s `slotmap`-backed node graph
//! (`src/node/graph.rs`), which solves the same problem for a YAML node
//! tree: cyclic `parent`/`super` references become indices into a `SlotMap`
//! instead of owning pointers, so cloning and relinking never fights the
//! borrow checker.

slotmap::new_key_type! {
    /// A tuple (scope) in the arena.
    pub struct TupleId;
    /// A deferred-value cell in the arena.
    pub struct DeferredId;
    /// A lambda definition in the arena.
    pub struct LambdaId;
    /// An if/elif/else ladder in the arena.
    pub struct LadderId;
}
