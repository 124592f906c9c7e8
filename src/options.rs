//! Runtime options (spec §6 "Options").
//!
//! A plain struct the host builds and passes to `load`/`load_file`, the way
//! `Runner::new` takes its configuration as direct constructor arguments
//! rather than reading it from a config file (see `SPEC_FULL.md` §4.L).

use std::{cell::RefCell, path::PathBuf, rc::Rc};

use indexmap::IndexMap;

use crate::{error::YamletResult, value::cache::CachePolicy, value::Value};

/// A host-registered function, invoked with arguments already evaluated in
/// their natural order (spec §4.E).
pub type HostFn = Rc<dyn Fn(&[Value], &[(Rc<str>, Value)]) -> YamletResult<Value>>;

/// How a user tag's scalar text is pre-processed before the user callable
/// sees it (spec §4.C "User tag" row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorStyle {
    /// Hand the raw scalar text to the callable unmodified.
    Raw,
    /// Parse as a plain scalar (string/int/float/bool) first.
    Scalar,
    /// Run string interpolation, then hand the callable the result.
    Fmt,
    /// Evaluate as an expression, then hand the callable the result.
    Expr,
}

/// A user tag callable: takes the pre-processed text/value and produces a
/// [`Value`]. Pairing a tag with a style lets `!tag:fmt`/`!tag:expr`/`!tag:raw`
/// override the default style per use site (spec §4.C).
pub type UserConstructorFn = Rc<dyn Fn(&str, ConstructorStyle) -> YamletResult<Value>>;

#[derive(Clone)]
pub struct UserConstructor {
    pub default_style: ConstructorStyle,
    pub build: UserConstructorFn,
}

/// Hook hit on every trace-frame push, so a host can mirror the engine's own
/// diagnostic narrative into its logger without the engine depending on one
/// (spec `SPEC_FULL.md` §4.K).
#[derive(Clone, Default)]
pub struct DebugOpts {
    pub trace_sink: Option<Rc<RefCell<dyn FnMut(&str)>>>,
}

impl std::fmt::Debug for DebugOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugOpts").field("trace_sink", &self.trace_sink.is_some()).finish()
    }
}

#[derive(Clone)]
pub struct Options {
    pub missing_name_value: Option<Value>,
    pub functions: IndexMap<Rc<str>, HostFn>,
    pub globals: IndexMap<Rc<str>, Value>,
    pub constructors: IndexMap<Rc<str>, UserConstructor>,
    pub caching: CachePolicy,
    pub debug_opts: DebugOpts,
    /// Directory relative imports from the root document resolve against.
    /// Only consulted by the default filesystem import resolver.
    pub root_dir: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            missing_name_value: None,
            functions: IndexMap::new(),
            globals: IndexMap::new(),
            constructors: IndexMap::new(),
            caching: CachePolicy::default(),
            debug_opts: DebugOpts::default(),
            root_dir: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("missing_name_value", &self.missing_name_value)
            .field("function_count", &self.functions.len())
            .field("global_count", &self.globals.len())
            .field("constructor_count", &self.constructors.len())
            .field("caching", &self.caching)
            .field("root_dir", &self.root_dir)
            .finish()
    }
}
