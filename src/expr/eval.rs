//! Evaluates a parsed [`Expr`] against a scope (spec §4.E "Expression
//! evaluation").

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    engine::Engine,
    error::{FailureKind, YamletError, YamletResult},
    lambda::LambdaDef,
    point::SourceSpan,
    resolve::resolve_name,
    trace::Trace,
    value::{tuple::TupleData, Cell, MapKey, TupleId, Value},
};

use super::ast::{BinOp, BoolOp, CmpOp, CompClause, CompKind, Expr, Subscript, UnaryOp};
use super::builtins;

fn type_err(msg: impl Into<String>) -> YamletError {
    YamletError::new(FailureKind::NotImplemented, msg.into())
}

pub(crate) fn eval(engine: &mut Engine, trace: &mut Trace, ast: &Expr, scope: TupleId, point: &SourceSpan) -> YamletResult<Value> {
    match ast {
        Expr::ConstStr(s) => {
            let interpolated = super::interpolate(engine, trace, s, scope, point.clone())?;
            Ok(Value::Str(Rc::from(interpolated)))
        }
        Expr::ConstInt(i) => Ok(Value::Int(*i)),
        Expr::ConstFloat(f) => Ok(Value::Float(*f)),
        Expr::ConstBool(b) => Ok(Value::Bool(*b)),
        Expr::ConstNull => Ok(Value::Sentinel(crate::value::Sentinel::Null)),
        Expr::Name(name) => resolve_name(engine, trace, scope, name, true),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(engine, trace, item, scope, point)?);
            }
            Ok(Value::Sequence(Rc::new(out)))
        }
        Expr::HostTuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(engine, trace, item, scope, point)?);
            }
            Ok(Value::HostTuple(Rc::new(out)))
        }
        Expr::SetLit(items) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                let v = eval(engine, trace, item, scope, point)?;
                if !out.iter().any(|existing| crate::value::values_structurally_equal(existing, &v)) {
                    out.push(v);
                }
            }
            Ok(Value::Set(Rc::new(out)))
        }
        Expr::Dict(pairs) => {
            // A `{...}` mapping literal becomes a real tuple, not a host
            // map, so it can sit on either side of `@` (spec §4.D/E) the
            // same way any other tuple can. Values are evaluated against
            // the enclosing scope up front rather than deferred into the
            // new tuple the way a YAML-level mapping would be, so a later
            // composition of this literal won't re-resolve names inside it.
            let mut data = TupleData::new(point.clone());
            data.parent = Some(scope);
            let new_id = engine.alloc_tuple(data);
            for (k, v) in pairs {
                // A bareword key (`{color: ...}`) names a field directly,
                // the way a YAML mapping key would, rather than looking up
                // a variable called `color`; anything else (a string, a
                // computed expression) is evaluated and stringified.
                let key: Rc<str> = match k {
                    Expr::Name(name) => name.clone(),
                    _ => {
                        let key = eval(engine, trace, k, scope, point)?;
                        Rc::from(stringify(engine, &key))
                    }
                };
                let val = eval(engine, trace, v, scope, point)?;
                engine.tuple_mut(new_id).cells.insert(key, Cell::Value(val));
            }
            Ok(Value::Tuple(new_id))
        }
        Expr::Comp(kind) => eval_comprehension(engine, trace, kind, scope, point),
        Expr::Attribute(base, attr) => {
            let v = eval(engine, trace, base, scope, point)?;
            match v {
                Value::Tuple(t) => resolve_name(engine, trace, t, attr, false),
                other => host_attribute(&other, attr, trace),
            }
        }
        Expr::Subscript(base, sub) => {
            let v = eval(engine, trace, base, scope, point)?;
            eval_subscript(engine, trace, v, sub, scope, point)
        }
        Expr::Unary(op, x) => {
            let v = eval(engine, trace, x, scope, point)?;
            eval_unary(*op, v, trace)
        }
        Expr::Binary(op, a, b) => {
            let va = eval(engine, trace, a, scope, point)?;
            let vb = eval(engine, trace, b, scope, point)?;
            eval_binop(*op, va, vb, trace)
        }
        Expr::Compose(a, b) => {
            let va = eval(engine, trace, a, scope, point)?;
            let vb = eval(engine, trace, b, scope, point)?;
            let ta = va.as_tuple().ok_or_else(|| type_err(format!("cannot compose a {}", va.type_name())).with_frames(trace.snapshot()))?;
            let tb = vb.as_tuple().ok_or_else(|| type_err(format!("cannot compose a {}", vb.type_name())).with_frames(trace.snapshot()))?;
            let result = engine.composite(trace, &[ta, tb], scope, point.clone())?;
            Ok(Value::Tuple(result))
        }
        Expr::BoolOp(op, a, b) => {
            let va = eval(engine, trace, a, scope, point)?;
            match op {
                BoolOp::And => {
                    if va.is_falsy() {
                        Ok(va)
                    } else {
                        eval(engine, trace, b, scope, point)
                    }
                }
                BoolOp::Or => {
                    if va.is_truthy() {
                        Ok(va)
                    } else {
                        eval(engine, trace, b, scope, point)
                    }
                }
            }
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(engine, trace, first, scope, point)?;
            for (op, rhs_expr) in rest {
                let right = eval(engine, trace, rhs_expr, scope, point)?;
                if !eval_compare(*op, &left, &right, trace)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::IfExp { test, body, orelse } => {
            let t = eval(engine, trace, test, scope, point)?;
            if t.is_truthy() {
                eval(engine, trace, body, scope, point)
            } else {
                eval(engine, trace, orelse, scope, point)
            }
        }
        Expr::Call { func, args, kwargs } => eval_call(engine, trace, func, args, kwargs, scope, point),
    }
}

fn value_to_map_key(v: &Value, trace: &mut Trace) -> YamletResult<MapKey> {
    match v {
        Value::Str(s) => Ok(MapKey::Str(s.clone())),
        Value::Int(i) => Ok(MapKey::Int(*i)),
        Value::Bool(b) => Ok(MapKey::Bool(*b)),
        other => Err(type_err(format!("{} is not usable as a mapping key", other.type_name())).with_frames(trace.snapshot())),
    }
}

pub(crate) fn stringify(engine: &Engine, v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Sentinel(s) => s.to_string(),
        Value::Sequence(items) | Value::HostTuple(items) | Value::Set(items) => {
            let parts: Vec<String> = items.iter().map(|i| stringify(engine, i)).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::HostMap(m) => {
            let parts: Vec<String> = m.iter().map(|(k, v)| format!("{k}: {}", stringify(engine, v))).collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Tuple(id) => format!("<tuple {:?}>", id),
        Value::Lambda(id) => format!("<lambda {:?}>", id),
        Value::Host(h) => format!("{h:?}"),
    }
}

fn host_attribute(v: &Value, attr: &str, trace: &mut Trace) -> YamletResult<Value> {
    match v {
        Value::HostMap(m) => m
            .get(&MapKey::Str(Rc::from(attr)))
            .cloned()
            .ok_or_else(|| type_err(format!("no attribute `{attr}` on mapping")).with_frames(trace.snapshot())),
        other => Err(type_err(format!("{} has no attribute `{attr}`", other.type_name())).with_frames(trace.snapshot())),
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let n = len as i64;
    let idx = if i < 0 { i + n } else { i };
    if idx < 0 || idx >= n {
        None
    } else {
        Some(idx as usize)
    }
}

fn eval_subscript(
    engine: &mut Engine,
    trace: &mut Trace,
    base: Value,
    sub: &Subscript,
    scope: TupleId,
    point: &SourceSpan,
) -> YamletResult<Value> {
    match sub {
        Subscript::Index(idx_expr) => {
            let idx_value = eval(engine, trace, idx_expr, scope, point)?;
            match (&base, &idx_value) {
                (Value::Tuple(t), Value::Str(key)) => resolve_name(engine, trace, *t, key, false),
                (Value::Sequence(items), Value::Int(i)) | (Value::HostTuple(items), Value::Int(i)) => {
                    normalize_index(*i, items.len())
                        .map(|pos| items[pos].clone())
                        .ok_or_else(|| type_err("index out of range").with_frames(trace.snapshot()))
                }
                (Value::Str(s), Value::Int(i)) => {
                    let chars: Vec<char> = s.chars().collect();
                    normalize_index(*i, chars.len())
                        .map(|pos| Value::Str(Rc::from(chars[pos].to_string())))
                        .ok_or_else(|| type_err("index out of range").with_frames(trace.snapshot()))
                }
                (Value::HostMap(m), key) => {
                    let k = value_to_map_key(key, trace)?;
                    m.get(&k).cloned().ok_or_else(|| type_err(format!("no key `{k}`")).with_frames(trace.snapshot()))
                }
                _ => Err(type_err(format!("cannot index a {} with a {}", base.type_name(), idx_value.type_name()))
                    .with_frames(trace.snapshot())),
            }
        }
        Subscript::Slice { lo, hi, step } => {
            if step.is_some() {
                return Err(type_err("stepped slices are not supported").with_frames(trace.snapshot()));
            }
            let eval_bound = |engine: &mut Engine, trace: &mut Trace, e: &Option<Box<Expr>>| -> YamletResult<Option<i64>> {
                match e {
                    Some(expr) => match eval(engine, trace, expr, scope, point)? {
                        Value::Int(i) => Ok(Some(i)),
                        other => Err(type_err(format!("slice bound must be an int, got {}", other.type_name())).with_frames(trace.snapshot())),
                    },
                    None => Ok(None),
                }
            };
            let lo = eval_bound(engine, trace, lo)?;
            let hi = eval_bound(engine, trace, hi)?;
            match base {
                Value::Sequence(items) => Ok(Value::Sequence(Rc::new(slice_vec(&items, lo, hi)))),
                Value::HostTuple(items) => Ok(Value::HostTuple(Rc::new(slice_vec(&items, lo, hi)))),
                Value::Str(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let sliced = slice_vec(&chars, lo, hi);
                    Ok(Value::Str(Rc::from(sliced.into_iter().collect::<String>())))
                }
                other => Err(type_err(format!("cannot slice a {}", other.type_name())).with_frames(trace.snapshot())),
            }
        }
    }
}

fn slice_vec<T: Clone>(items: &[T], lo: Option<i64>, hi: Option<i64>) -> Vec<T> {
    let len = items.len() as i64;
    let clamp = |v: i64| -> usize {
        let v = if v < 0 { v + len } else { v };
        v.clamp(0, len) as usize
    };
    let start = lo.map(clamp).unwrap_or(0);
    let end = hi.map(clamp).unwrap_or(items.len());
    if start >= end {
        Vec::new()
    } else {
        items[start..end].to_vec()
    }
}

fn eval_unary(op: UnaryOp, v: Value, trace: &mut Trace) -> YamletResult<Value> {
    match (op, &v) {
        (UnaryOp::Pos, Value::Int(i)) => Ok(Value::Int(*i)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, _) => Ok(Value::Bool(v.is_falsy())),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        _ => Err(type_err(format!("unary operator not defined for {}", v.type_name())).with_frames(trace.snapshot())),
    }
}

fn eval_binop(op: BinOp, a: Value, b: Value, trace: &mut Trace) -> YamletResult<Value> {
    use BinOp::*;
    match op {
        Add => match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
            (Value::Float(_), _) | (_, Value::Float(_)) => Ok(Value::Float(as_f64(&a, trace)? + as_f64(&b, trace)?)),
            (Value::Str(x), Value::Str(y)) => Ok(Value::Str(Rc::from(format!("{x}{y}")))),
            (Value::Sequence(x), Value::Sequence(y)) => {
                Ok(Value::Sequence(Rc::new(x.iter().chain(y.iter()).cloned().collect())))
            }
            (Value::HostTuple(x), Value::HostTuple(y)) => {
                Ok(Value::HostTuple(Rc::new(x.iter().chain(y.iter()).cloned().collect())))
            }
            _ => Err(binop_err("+", &a, &b, trace)),
        },
        Sub => numeric_binop(a, b, trace, "-", |x, y| x - y, |x, y| x - y),
        Mul => match (&a, &b) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                Ok(Value::Str(Rc::from(s.repeat((*n).max(0) as usize))))
            }
            _ => numeric_binop(a, b, trace, "*", |x, y| x * y, |x, y| x * y),
        },
        Div => Ok(Value::Float(as_f64(&a, trace)? / as_f64(&b, trace)?)),
        FloorDiv => match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    Err(type_err("division by zero").with_frames(trace.snapshot()))
                } else {
                    Ok(Value::Int(x.div_euclid(*y)))
                }
            }
            _ => Ok(Value::Float((as_f64(&a, trace)? / as_f64(&b, trace)?).floor())),
        },
        Mod => match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    Err(type_err("modulo by zero").with_frames(trace.snapshot()))
                } else {
                    Ok(Value::Int(x.rem_euclid(*y)))
                }
            }
            _ => Ok(Value::Float(as_f64(&a, trace)? % as_f64(&b, trace)?)),
        },
        BitAnd => int_binop(a, b, trace, "&", |x, y| x & y),
        BitOr => int_binop(a, b, trace, "|", |x, y| x | y),
        BitXor => int_binop(a, b, trace, "^", |x, y| x ^ y),
        LShift => int_binop(a, b, trace, "<<", |x, y| x << y),
        RShift => int_binop(a, b, trace, ">>", |x, y| x >> y),
    }
}

fn as_f64(v: &Value, trace: &mut Trace) -> YamletResult<f64> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(type_err(format!("expected a number, got {}", other.type_name())).with_frames(trace.snapshot())),
    }
}

fn binop_err(op: &str, a: &Value, b: &Value, trace: &mut Trace) -> YamletError {
    type_err(format!("`{op}` not defined between {} and {}", a.type_name(), b.type_name())).with_frames(trace.snapshot())
}

fn numeric_binop(a: Value, b: Value, trace: &mut Trace, op: &str, fi: fn(i64, i64) -> i64, ff: fn(f64, f64) -> f64) -> YamletResult<Value> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(fi(*x, *y))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(ff(as_f64(&a, trace)?, as_f64(&b, trace)?))),
        _ => Err(binop_err(op, &a, &b, trace)),
    }
}

fn int_binop(a: Value, b: Value, trace: &mut Trace, op: &str, f: fn(i64, i64) -> i64) -> YamletResult<Value> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(f(*x, *y))),
        _ => Err(binop_err(op, &a, &b, trace)),
    }
}

fn values_ordered(a: &Value, b: &Value, trace: &mut Trace) -> YamletResult<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_f64(a, trace)?.partial_cmp(&as_f64(b, trace)?).ok_or_else(|| type_err("NaN is not ordered").with_frames(trace.snapshot()))
        }
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(type_err(format!("cannot order {} and {}", a.type_name(), b.type_name())).with_frames(trace.snapshot())),
    }
}

fn eval_compare(op: CmpOp, a: &Value, b: &Value, trace: &mut Trace) -> YamletResult<bool> {
    match op {
        CmpOp::Eq => Ok(crate::value::values_structurally_equal(a, b)),
        CmpOp::Ne => Ok(!crate::value::values_structurally_equal(a, b)),
        CmpOp::Lt => Ok(values_ordered(a, b, trace)?.is_lt()),
        CmpOp::Le => Ok(values_ordered(a, b, trace)?.is_le()),
        CmpOp::Gt => Ok(values_ordered(a, b, trace)?.is_gt()),
        CmpOp::Ge => Ok(values_ordered(a, b, trace)?.is_ge()),
        CmpOp::Is => Ok(is_same(a, b)),
        CmpOp::IsNot => Ok(!is_same(a, b)),
        CmpOp::In => eval_contains(b, a, trace),
        CmpOp::NotIn => Ok(!eval_contains(b, a, trace)?),
    }
}

fn is_same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Sentinel(x), Value::Sentinel(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => x == y,
        (Value::Lambda(x), Value::Lambda(y)) => x == y,
        _ => crate::value::values_structurally_equal(a, b),
    }
}

fn eval_contains(container: &Value, item: &Value, trace: &mut Trace) -> YamletResult<bool> {
    match container {
        Value::Sequence(items) | Value::HostTuple(items) | Value::Set(items) => {
            Ok(items.iter().any(|v| crate::value::values_structurally_equal(v, item)))
        }
        Value::HostMap(m) => {
            let key = value_to_map_key(item, trace)?;
            Ok(m.contains_key(&key))
        }
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            _ => Err(type_err("`in` on a string requires a string").with_frames(trace.snapshot())),
        },
        other => Err(type_err(format!("`in` not defined for {}", other.type_name())).with_frames(trace.snapshot())),
    }
}

fn eval_call(
    engine: &mut Engine,
    trace: &mut Trace,
    func: &Expr,
    args: &[Expr],
    kwargs: &[(Rc<str>, Expr)],
    scope: TupleId,
    point: &SourceSpan,
) -> YamletResult<Value> {
    if let Expr::Name(name) = func {
        if name.as_ref() == "cond" {
            return builtins::eval_cond(engine, trace, args, scope, point);
        }
        match resolve_name(engine, trace, scope, name, true) {
            Ok(Value::Lambda(id)) => return call_lambda(engine, trace, id, args, kwargs, scope, point),
            Ok(other) => return Err(type_err(format!("`{name}` is not callable (got {})", other.type_name())).with_frames(trace.snapshot())),
            Err(_) => {}
        }
        if let Some(hostfn) = engine.options().functions.get(name.as_ref()).cloned() {
            let (pos, kw) = eval_args(engine, trace, args, kwargs, scope, point)?;
            return hostfn(&pos, &kw).map_err(|e| e.with_frames(trace.snapshot()));
        }
        let (pos, _kw) = eval_args(engine, trace, args, kwargs, scope, point)?;
        return builtins::call_builtin(engine, name, &pos, trace);
    }
    let callee = eval(engine, trace, func, scope, point)?;
    match callee {
        Value::Lambda(id) => call_lambda(engine, trace, id, args, kwargs, scope, point),
        other => Err(type_err(format!("value of type {} is not callable", other.type_name())).with_frames(trace.snapshot())),
    }
}

fn eval_args(
    engine: &mut Engine,
    trace: &mut Trace,
    args: &[Expr],
    kwargs: &[(Rc<str>, Expr)],
    scope: TupleId,
    point: &SourceSpan,
) -> YamletResult<(Vec<Value>, Vec<(Rc<str>, Value)>)> {
    let mut pos = Vec::with_capacity(args.len());
    for a in args {
        pos.push(eval(engine, trace, a, scope, point)?);
    }
    let mut kw = Vec::with_capacity(kwargs.len());
    for (name, expr) in kwargs {
        kw.push((name.clone(), eval(engine, trace, expr, scope, point)?));
    }
    Ok((pos, kw))
}

/// Calls a lambda (spec §4.E "Lambda calling convention", grounded on
/// `lambda.rs`'s `ParamList::parse`/`bind_positions`): a fresh tuple is
/// allocated as the call scope, parented to the lambda's closure, with each
/// parameter bound as a cell before the body is evaluated. Defaults are
/// evaluated in the lambda's *defining* scope, not the call scope.
fn call_lambda(
    engine: &mut Engine,
    trace: &mut Trace,
    id: crate::value::LambdaId,
    args: &[Expr],
    kwargs: &[(Rc<str>, Expr)],
    scope: TupleId,
    point: &SourceSpan,
) -> YamletResult<Value> {
    let (pos, kw) = eval_args(engine, trace, args, kwargs, scope, point)?;
    let LambdaDef { params, body, closure, point: def_point } = engine.lambda(id).clone();
    let bound = crate::lambda::bind_positions(&params, &pos, &kw).map_err(|e| e.with_frames(trace.snapshot()))?;
    let call_scope = engine.alloc_tuple(crate::value::tuple::TupleData::new(def_point.clone()));
    engine.tuple_mut(call_scope).parent = Some(closure);
    for (param, (name, value)) in params.0.iter().zip(bound.into_iter()) {
        let v = match value {
            Some(v) => v,
            None => match &param.default {
                Some(default_text) => super::eval_text(engine, trace, default_text, closure, def_point.clone())?,
                None => {
                    return Err(YamletError::new(FailureKind::LambdaCallError, format!("missing argument `{name}`"))
                        .with_frames(trace.snapshot()));
                }
            },
        };
        engine.tuple_mut(call_scope).cells.insert(name, crate::value::Cell::Value(v));
    }
    super::eval_text(engine, trace, &body, call_scope, def_point)
}

fn eval_comprehension(engine: &mut Engine, trace: &mut Trace, kind: &CompKind, scope: TupleId, point: &SourceSpan) -> YamletResult<Value> {
    match kind {
        CompKind::List { elt, clauses } => {
            let mut out = Vec::new();
            run_clauses(engine, trace, clauses, 0, scope, point, &mut |engine, trace, inner_scope| {
                out.push(eval(engine, trace, elt, inner_scope, point)?);
                Ok(())
            })?;
            Ok(Value::Sequence(Rc::new(out)))
        }
        CompKind::Set { elt, clauses } => {
            let mut out: Vec<Value> = Vec::new();
            run_clauses(engine, trace, clauses, 0, scope, point, &mut |engine, trace, inner_scope| {
                let v = eval(engine, trace, elt, inner_scope, point)?;
                if !out.iter().any(|existing| crate::value::values_structurally_equal(existing, &v)) {
                    out.push(v);
                }
                Ok(())
            })?;
            Ok(Value::Set(Rc::new(out)))
        }
        CompKind::Dict { key, value, clauses } => {
            let mut map = IndexMap::new();
            run_clauses(engine, trace, clauses, 0, scope, point, &mut |engine, trace, inner_scope| {
                let k = eval(engine, trace, key, inner_scope, point)?;
                let k = value_to_map_key(&k, trace)?;
                let v = eval(engine, trace, value, inner_scope, point)?;
                map.insert(k, v);
                Ok(())
            })?;
            Ok(Value::HostMap(Rc::new(map)))
        }
    }
}

/// Recursively walks nested `for`/`if` comprehension clauses, binding each
/// iteration's target name in a fresh child tuple before calling `body`.
fn run_clauses(
    engine: &mut Engine,
    trace: &mut Trace,
    clauses: &[CompClause],
    index: usize,
    scope: TupleId,
    point: &SourceSpan,
    body: &mut dyn FnMut(&mut Engine, &mut Trace, TupleId) -> YamletResult<()>,
) -> YamletResult<()> {
    let Some(clause) = clauses.get(index) else {
        return body(engine, trace, scope);
    };
    let iterable = eval(engine, trace, &clause.iter, scope, point)?;
    let items: Vec<Value> = match iterable {
        Value::Sequence(v) | Value::HostTuple(v) | Value::Set(v) => v.as_ref().clone(),
        Value::HostMap(m) => m.keys().map(value_of_map_key).collect(),
        Value::Str(s) => s.chars().map(|c| Value::Str(Rc::from(c.to_string()))).collect(),
        other => return Err(type_err(format!("cannot iterate over {}", other.type_name())).with_frames(trace.snapshot())),
    };
    for item in items {
        let child = engine.alloc_tuple(crate::value::tuple::TupleData::new(point.clone()));
        engine.tuple_mut(child).parent = Some(scope);
        engine.tuple_mut(child).cells.insert(clause.target.clone(), crate::value::Cell::Value(item));
        let mut keep = true;
        for cond in &clause.ifs {
            if eval(engine, trace, cond, child, point)?.is_falsy() {
                keep = false;
                break;
            }
        }
        if keep {
            run_clauses(engine, trace, clauses, index + 1, child, point, body)?;
        }
    }
    Ok(())
}

fn value_of_map_key(k: &MapKey) -> Value {
    match k {
        MapKey::Str(s) => Value::Str(s.clone()),
        MapKey::Int(i) => Value::Int(*i),
        MapKey::Bool(b) => Value::Bool(*b),
    }
}
