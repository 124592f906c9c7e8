//! The public surface (spec §6): `load`/`load_file`, and the thin
//! `Document`/`TupleHandle` wrappers a host drives the engine through. The
//! engine itself never borrows past one call — `Document` owns it behind a
//! `RefCell` so a handle tree can be walked with plain shared references.

use std::{cell::RefCell, fs, path::Path, rc::Rc};

use crate::{
    engine::Engine,
    error::{FailureKind, YamletError, YamletResult},
    import::{FsImportResolver, ImportResolver},
    options::Options,
    trace::Trace,
    value::{TupleId, Value},
};

/// Parses and constructs `text` as a document, using the default filesystem
/// import resolver. Relative `!import`s resolve against `options.root_dir`
/// if set, otherwise against the process working directory.
pub fn load(text: &str, options: Options) -> YamletResult<Document> {
    load_with_resolver(text, options, Box::new(FsImportResolver))
}

/// Reads and loads a document from disk, defaulting `options.root_dir` to
/// the file's own directory so sibling `!import`s resolve relative to it.
pub fn load_file(path: impl AsRef<Path>, mut options: Options) -> YamletResult<Document> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        YamletError::new(FailureKind::ImportNotFound, format!("cannot read `{}`: {e}", path.display()))
    })?;
    if options.root_dir.is_none() {
        options.root_dir = path.parent().map(|p| p.to_path_buf());
    }
    load_with_resolver(&text, options, Box::new(FsImportResolver))
}

/// Entry point for a host supplying its own [`ImportResolver`] (tests,
/// embedders with a virtual filesystem).
pub fn load_with_resolver(text: &str, options: Options, resolver: Box<dyn ImportResolver>) -> YamletResult<Document> {
    let mut engine = Engine::new(options, resolver);
    let root = engine.load_document(text, Rc::from("<root>"))?;
    Ok(Document { engine: RefCell::new(engine), root })
}

/// A loaded document: one engine instance, rooted at one tuple.
pub struct Document {
    engine: RefCell<Engine>,
    root: TupleId,
}

impl Document {
    /// A handle onto the document's root tuple.
    pub fn root(&self) -> TupleHandle<'_> {
        TupleHandle { doc: self, id: self.root }
    }
}

/// A view onto one tuple within a [`Document`]. Cheap to copy/hand around —
/// it's just an arena index plus a borrow of the owning document.
#[derive(Clone, Copy)]
pub struct TupleHandle<'a> {
    doc: &'a Document,
    id: TupleId,
}

impl<'a> TupleHandle<'a> {
    /// Looks `key` up directly on this tuple (no outward walk): `null`
    /// raises *name not found*, `external` raises *access on external*
    /// (spec §8 boundary behaviors).
    pub fn get(&self, key: &str) -> YamletResult<Value> {
        let mut engine = self.doc.engine.borrow_mut();
        let mut trace = Trace::new();
        engine.get_key(&mut trace, self.id, key)
    }

    /// `get`, then narrows the result to a nested tuple handle.
    pub fn get_tuple(&self, key: &str) -> YamletResult<TupleHandle<'a>> {
        let value = self.get(key)?;
        match value.as_tuple() {
            Some(id) => Ok(TupleHandle { doc: self.doc, id }),
            None => Err(YamletError::new(
                FailureKind::NotImplemented,
                format!("`{key}` is a {}, not a tuple", value.type_name()),
            )),
        }
    }

    /// `__contains__`: whether `key` is present, not null, and not
    /// `!local` (spec §6).
    pub fn contains(&self, key: &str) -> bool {
        self.doc.engine.borrow().tuple(self.id).is_enumerable(key)
    }

    /// Excludes `null`-erased and `!local` keys, per spec §6.
    pub fn len(&self) -> usize {
        self.doc.engine.borrow().tuple(self.id).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered key iteration (spec §6), excluding `null`-erased and
    /// `!local` keys.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.doc.engine.borrow().tuple(self.id).enumerable_keys().map(Rc::from).collect()
    }

    /// `items()`: each enumerable key paired with its resolved value.
    pub fn items(&self) -> YamletResult<Vec<(Rc<str>, Value)>> {
        let keys = self.keys();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.get(&key)?;
            out.push((key, value));
        }
        Ok(out)
    }

    /// `values()`: each enumerable key's resolved value, in order.
    pub fn values(&self) -> YamletResult<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    /// A human-readable provenance narrative for `key` (spec §6
    /// `explain_value`).
    pub fn explain_value(&self, key: &str) -> String {
        self.doc.engine.borrow_mut().explain_value(self.id, key)
    }

    /// Recursively resolves this tuple to a concrete host-native value
    /// (nested tuples become [`Value::HostMap`]s), per spec §6
    /// `evaluate_fully`.
    pub fn evaluate_fully(&self) -> YamletResult<Value> {
        let mut engine = self.doc.engine.borrow_mut();
        let mut trace = Trace::new();
        engine.evaluate_fully(&mut trace, self.id)
    }
}
