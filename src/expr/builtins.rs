//! Builtin functions (spec §4.E "Builtins surface"): `cond`, `len`, `int`,
//! `float`, `str`. `cond` is argument-deferring — its branches are evaluated
//! lazily in the call's scope, so it is dispatched directly from
//! `eval::eval`'s `Call` arm rather than through the normal evaluate-then-call
//! path every other builtin takes.

use std::rc::Rc;

use crate::{
    engine::Engine,
    error::{FailureKind, YamletError, YamletResult},
    point::SourceSpan,
    trace::Trace,
    value::{TupleId, Value},
};

use super::ast::Expr;
use super::eval::{eval, stringify};

fn arity_error(name: &str, expected: usize, got: usize) -> YamletError {
    YamletError::new(FailureKind::LambdaCallError, format!("`{name}` expects {expected} argument(s), got {got}"))
}

pub(crate) fn eval_cond(
    engine: &mut Engine,
    trace: &mut Trace,
    args: &[Expr],
    scope: TupleId,
    point: &SourceSpan,
) -> YamletResult<Value> {
    if args.len() != 3 {
        return Err(arity_error("cond", 3, args.len()).with_frames(trace.snapshot()));
    }
    let c = eval(engine, trace, &args[0], scope, point)?;
    if c.is_truthy() {
        eval(engine, trace, &args[1], scope, point)
    } else {
        eval(engine, trace, &args[2], scope, point)
    }
}

/// Dispatches one of the eagerly-evaluated builtins by name. Returns a
/// *name not found*-flavored error if `name` isn't one of them, so the
/// caller's fallback chain (scope lookup, then host functions, then this)
/// produces one coherent "no such function" message.
pub(crate) fn call_builtin(
    engine: &Engine,
    name: &str,
    args: &[Value],
    trace: &mut Trace,
) -> YamletResult<Value> {
    match name {
        "len" => {
            if args.len() != 1 {
                return Err(arity_error("len", 1, args.len()).with_frames(trace.snapshot()));
            }
            builtin_len(engine, &args[0], trace)
        }
        "int" => {
            if args.len() != 1 {
                return Err(arity_error("int", 1, args.len()).with_frames(trace.snapshot()));
            }
            builtin_int(&args[0], trace)
        }
        "float" => {
            if args.len() != 1 {
                return Err(arity_error("float", 1, args.len()).with_frames(trace.snapshot()));
            }
            builtin_float(&args[0], trace)
        }
        "str" => {
            if args.len() != 1 {
                return Err(arity_error("str", 1, args.len()).with_frames(trace.snapshot()));
            }
            Ok(Value::Str(Rc::from(stringify(engine, &args[0]))))
        }
        other => Err(YamletError::new(FailureKind::NameNotFound, format!("no function called `{other}`"))
            .with_frames(trace.snapshot())),
    }
}

fn builtin_len(engine: &Engine, v: &Value, trace: &mut Trace) -> YamletResult<Value> {
    let n = match v {
        Value::Str(s) => s.chars().count(),
        Value::Sequence(items) | Value::HostTuple(items) | Value::Set(items) => items.len(),
        Value::HostMap(m) => m.len(),
        Value::Tuple(id) => engine.tuple(*id).len(),
        other => {
            return Err(YamletError::new(FailureKind::NotImplemented, format!("`len` has no meaning for {}", other.type_name()))
                .with_frames(trace.snapshot()));
        }
    };
    Ok(Value::Int(n as i64))
}

fn builtin_int(v: &Value, trace: &mut Trace) -> YamletResult<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            YamletError::new(FailureKind::NotImplemented, format!("cannot convert `{s}` to int")).with_frames(trace.snapshot())
        }),
        other => Err(YamletError::new(FailureKind::NotImplemented, format!("cannot convert {} to int", other.type_name()))
            .with_frames(trace.snapshot())),
    }
}

fn builtin_float(v: &Value, trace: &mut Trace) -> YamletResult<Value> {
    match v {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            YamletError::new(FailureKind::NotImplemented, format!("cannot convert `{s}` to float")).with_frames(trace.snapshot())
        }),
        other => Err(YamletError::new(FailureKind::NotImplemented, format!("cannot convert {} to float", other.type_name()))
            .with_frames(trace.snapshot())),
    }
}
