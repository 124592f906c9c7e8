//! Yamlet: a GCL-style expression and templating layer over YAML (spec §1).
//!
//! Mapping nodes become lexically-scoped *tuples*; tagged scalars introduce
//! deferred computation (string interpolation, expressions, imports,
//! lambdas); a composition operator merges tuples with override semantics;
//! and `!if`/`!elif`/`!else`/`!local` restructure a tuple at load time.
//!
//! The public surface is [`load`]/[`load_file`] plus the [`Document`]/
//! [`TupleHandle`] pair they return. Everything else in this crate is the
//! evaluation engine the facade drives.

mod construct;
mod engine;
mod error;
mod expr;
mod facade;
mod import;
mod ladder;
mod lambda;
mod options;
mod point;
mod preprocess;
mod resolve;
mod trace;
mod value;
mod yaml;

pub use error::{FailureKind, YamletError, YamletResult};
pub use facade::{load, load_file, load_with_resolver, Document, TupleHandle};
pub use import::{FsImportResolver, ImportInfo, ImportResolver, ImportSource};
pub use options::{ConstructorStyle, DebugOpts, HostFn, Options, UserConstructor, UserConstructorFn};
pub use point::{SourcePoint, SourceSpan};
pub use value::{
    cache::CachePolicy,
    compositable::HostValue,
    values_structurally_equal, MapKey, Sentinel, Value,
};
