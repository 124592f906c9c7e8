//! The import resolver collaborator and loader-owned module cache (spec §5
//! "Shared-resource policy", §6 "Import resolver").

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    error::{FailureKind, YamletError, YamletResult},
    value::{TupleId, Value},
    yaml::RawNode,
};

/// Either a module tuple that's already loaded, or raw bytes to parse from
/// the top of the engine (spec §6).
pub enum ImportSource {
    Bytes(String),
    Tree(RawNode),
}

pub struct ImportInfo {
    /// Canonical key the loader's module cache is addressed by.
    pub canonical_key: String,
    pub source: ImportSource,
    /// Names visible only while resolving inside the imported module,
    /// layered below the module's own globals (spec §4.B "ImportLoad").
    pub module_globals: IndexMap<Rc<str>, Value>,
}

/// The out-of-core-scope collaborator that turns an `!import` string into
/// either a cached module or raw content to parse (spec §1, §6).
pub trait ImportResolver {
    fn resolve(&mut self, requested: &str, from_dir: Option<&Path>) -> YamletResult<ImportInfo>;
}

/// Reference filesystem resolver backing the `load_file` facade. Resolves
/// relative paths against the importing file's directory, not the process
/// working directory, per `SPEC_FULL.md` §10.
#[derive(Debug, Default)]
pub struct FsImportResolver;

impl ImportResolver for FsImportResolver {
    fn resolve(&mut self, requested: &str, from_dir: Option<&Path>) -> YamletResult<ImportInfo> {
        let path = PathBuf::from(requested);
        let resolved = if path.is_absolute() {
            path
        } else {
            from_dir.map(|dir| dir.join(&path)).unwrap_or(path)
        };
        let canonical_key = resolved.to_string_lossy().into_owned();
        let bytes = fs::read_to_string(&resolved).map_err(|e| {
            YamletError::new(FailureKind::ImportNotFound, format!("cannot read `{}`: {e}", resolved.display()))
        })?;
        Ok(ImportInfo { canonical_key, source: ImportSource::Bytes(bytes), module_globals: IndexMap::new() })
    }
}

/// The loader's process-local module cache, keyed by canonical path (spec
/// §5). `in_progress` distinguishes a re-entrant *import* of the same path
/// (an error) from a re-entrant *evaluation* of a cell inside an already
/// loaded module (permitted, since lookups are deferred).
#[derive(Debug, Default)]
pub struct ModuleCache {
    loaded: IndexMap<String, TupleId>,
    in_progress: HashSet<String>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<TupleId> {
        self.loaded.get(key).copied()
    }

    pub fn begin_loading(&mut self, key: &str) -> YamletResult<()> {
        if !self.in_progress.insert(key.to_owned()) {
            return Err(YamletError::new(FailureKind::ImportCycle, format!("import cycle detected loading `{key}`")));
        }
        Ok(())
    }

    pub fn finish_loading(&mut self, key: &str, tuple: TupleId) {
        self.in_progress.remove(key);
        self.loaded.insert(key.to_owned(), tuple);
    }
}
