//! The erasure rule (spec §4.H "Erasure rule"): after a tuple's pairs have
//! been rewritten by `crate::construct`'s if-ladder handling, any key whose
//! cell reports `is_undefined` (the ladder arm that won didn't set it) is
//! removed entirely, so it is absent to length, iteration, and `in` rather
//! than present-but-weird.
//!
//! Runs once when a freshly constructed document's root is returned, once
//! more whenever a `PreprocessingTuple` wrapper is forced (every other
//! nested mapping in the document), and again on every `composite()` result
//! since merging can flip which arm of a carried-forward ladder wins.

use std::rc::Rc;

use crate::{engine::Engine, error::YamletResult, trace::Trace, value::{Cell, TupleId}};

pub(crate) fn run_erasure(engine: &mut Engine, trace: &mut Trace, tuple: TupleId) -> YamletResult<()> {
    let keys: Vec<Rc<str>> = engine.tuple(tuple).cells.keys().cloned().collect();
    for key in keys {
        let cell = engine.tuple(tuple).cells.get(&key).cloned();
        if let Some(Cell::Deferred(id)) = cell {
            if engine.is_undefined(trace, id)? {
                engine.tuple_mut(tuple).cells.shift_remove(&key);
                engine.tuple_mut(tuple).provenances.shift_remove(&key);
                engine.tuple_mut(tuple).locals.remove(&key);
            }
        }
    }
    Ok(())
}
