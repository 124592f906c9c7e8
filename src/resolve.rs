//! Name resolution across the tuple-scope chain (spec §4.F).

use std::rc::Rc;

use crate::{
    engine::Engine,
    error::{FailureKind, YamletError, YamletResult},
    trace::Trace,
    value::{Cell, Sentinel, TupleId, Value},
};

/// Resolves `name` starting at `scope`.
///
/// `outward` distinguishes a free-name lookup (walks `parent`, then module
/// globals, then user globals) from an attribute-narrowed lookup (`x.a`:
/// resolve `a` against `x` only, per spec §4.E's "no outward walk").
pub(crate) fn resolve_name(
    engine: &mut Engine,
    trace: &mut Trace,
    scope: TupleId,
    name: &str,
    outward: bool,
) -> YamletResult<Value> {
    match name {
        "up" => {
            return engine.tuple(scope).parent.map(Value::Tuple).ok_or_else(|| {
                YamletError::new(FailureKind::NameNotFound, "`up` has no enclosing scope here".to_owned())
                    .with_frames(trace.snapshot())
            });
        }
        "super" => {
            return engine.tuple(scope).super_.map(Value::Tuple).ok_or_else(|| {
                YamletError::new(FailureKind::NameNotFound, "`super` has no base tuple here".to_owned())
                    .with_frames(trace.snapshot())
            });
        }
        "external" => return Ok(Value::Sentinel(Sentinel::External)),
        "null" => return Ok(Value::Sentinel(Sentinel::Null)),
        _ => {}
    }

    let found = {
        let point = engine.tuple(scope).source.clone();
        let _guard = trace.branch_for_name_resolution(format!("looking up `{name}`"), Rc::from(name), point, scope);
        engine.tuple(scope).cells.get(name).cloned()
    };
    if let Some(cell) = found {
        match &cell {
            Cell::Sentinel(Sentinel::Null) => { /* falls through to the next scope, per spec §4.F step 2 */ }
            Cell::Sentinel(Sentinel::External) => {
                return Err(YamletError::new(FailureKind::AccessOnExternal, format!("`{name}` is external in this scope"))
                    .with_frames(trace.snapshot()));
            }
            _ => return engine.force_cell(trace, &cell),
        }
    }

    if outward {
        if let Some(parent) = engine.tuple(scope).parent {
            return resolve_name(engine, trace, parent, name, true);
        }
        if let Some(module_root) = engine.module_root_of(scope) {
            if let Some(v) = lookup_module_chain(engine, module_root, name) {
                return Ok(v);
            }
        }
        if let Some(v) = engine.options().globals.get(name).cloned() {
            return Ok(v);
        }
    }
    if let Some(default) = engine.options().missing_name_value.clone() {
        return Ok(default);
    }
    Err(YamletError::new(FailureKind::NameNotFound, format!("no variable called `{name}`")).with_frames(trace.snapshot()))
}

/// Walks the importing chain from `module_root` outward, per spec §4.F
/// "cross-module lookup": the module that imported `module_root` contributes
/// its own module-globals before the engine falls back to user globals.
fn lookup_module_chain(engine: &Engine, module_root: TupleId, name: &str) -> Option<Value> {
    let mut current = Some(module_root);
    while let Some(id) = current {
        if let Some(globals) = engine.module_globals_of(id) {
            if let Some(v) = globals.get(name) {
                return Some(v.clone());
            }
        }
        current = engine.module_parent_of(id);
    }
    None
}
