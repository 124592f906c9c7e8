//! The value model (spec §3 "Data model" / §4.B "Value model").

pub mod cache;
pub mod compositable;
pub mod deferred;
pub mod ids;
pub mod tuple;

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

pub use ids::{DeferredId, LadderId, LambdaId, TupleId};

use crate::value::compositable::HostValue;

/// The four sentinel values (spec §3). All compare distinct, all are falsy,
/// and `Empty` never escapes the cache machinery into user-visible values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Must be supplied by a compositing caller before the cell is read.
    External,
    /// Erases the key it occupies.
    Null,
    /// Internal "no contribution from this arm" marker.
    Undefined,
    /// Internal "cache not populated yet" marker.
    Empty,
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::External => "external",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// A hashable scalar usable as a mapping/set key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Str(Rc<str>),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A fully-resolved value produced by evaluation.
///
/// Collections are `Rc`-wrapped so cloning a `Value` around the evaluator
/// (which happens constantly: every cache hit, every composition step) never
/// deep-copies a large sequence or mapping.
#[derive(Debug, Clone)]
pub enum Value {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A YAML sequence or an expression `[...]` list literal.
    Sequence(Rc<Vec<Value>>),
    /// A parenthesized `(a, b, c)` expression literal. Distinct from a
    /// [`Value::Tuple`] scope: this is an immutable host sequence, not a
    /// name-resolution environment.
    HostTuple(Rc<Vec<Value>>),
    /// A `{a, b, c}` expression set literal.
    Set(Rc<Vec<Value>>),
    /// A plain, non-scope mapping: the output of `evaluate_fully` on a
    /// tuple, or a value handed back by a host function. Never itself a
    /// lexical scope — compare with [`Value::Tuple`].
    HostMap(Rc<IndexMap<MapKey, Value>>),
    /// A tuple (scope) in the arena.
    Tuple(TupleId),
    /// A lambda definition in the arena.
    Lambda(LambdaId),
    /// A host-registered compositable value (spec §4.B "User-compositable
    /// types").
    Host(Rc<dyn HostValue>),
    Sentinel(Sentinel),
}

impl Value {
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Bool(b) => !*b,
            Self::Sequence(v) | Self::HostTuple(v) | Self::Set(v) => v.is_empty(),
            Self::HostMap(m) => m.is_empty(),
            Self::Sentinel(_) => true,
            Self::Tuple(_) | Self::Lambda(_) | Self::Host(_) => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn as_tuple(&self) -> Option<TupleId> {
        match self {
            Self::Tuple(id) => Some(*id),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Sequence(_) => "list",
            Self::HostTuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::HostMap(_) => "mapping",
            Self::Tuple(_) => "tuple-scope",
            Self::Lambda(_) => "lambda",
            Self::Host(_) => "host",
            Self::Sentinel(s) => match s {
                Sentinel::External => "external",
                Sentinel::Null => "null",
                Sentinel::Undefined => "undefined",
                Sentinel::Empty => "empty",
            },
        }
    }
}

/// Structural equality used by `CACHE_DEBUG` to compare a fresh recompute
/// against the cached value (spec §9 Open Question: the corpus's plain
/// equality is host-dependent for nested tuples; here equality walks the
/// value recursively and two live tuple *scopes* compare equal only when
/// they are literally the same arena slot, since comparing their contents
/// would require an `Engine` reference this function doesn't have).
pub fn values_structurally_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Sequence(a), Value::Sequence(b))
        | (Value::HostTuple(a), Value::HostTuple(b))
        | (Value::Set(a), Value::Set(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_structurally_equal(x, y))
        }
        (Value::HostMap(a), Value::HostMap(b)) => {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| values_structurally_equal(v, bv)))
        }
        (Value::Tuple(a), Value::Tuple(b)) => a == b,
        (Value::Lambda(a), Value::Lambda(b)) => a == b,
        (Value::Sentinel(a), Value::Sentinel(b)) => a == b,
        (Value::Host(a), Value::Host(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// What a tuple cell holds before it is forced to a [`Value`] (spec §3
/// "Cell contents").
#[derive(Debug, Clone)]
pub enum Cell {
    Value(Value),
    Deferred(DeferredId),
    Sentinel(Sentinel),
}

impl Cell {
    pub fn null() -> Self {
        Self::Sentinel(Sentinel::Null)
    }

    pub fn external() -> Self {
        Self::Sentinel(Sentinel::External)
    }

    pub fn undefined() -> Self {
        Self::Sentinel(Sentinel::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Sentinel(Sentinel::Null))
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}
