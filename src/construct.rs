//! The YAML-tag constructor layer (spec §4.C): turns a [`RawNode`] tree into
//! tuples and cells. The if-ladder *rewrite* itself (opening/extending/
//! closing a ladder, wrapping collisions in a `FlatCompositor`) happens here,
//! inline with the pair-list walk, since it is a purely syntactic rewrite of
//! one mapping's pairs; `crate::preprocess` only holds the erasure rule that
//! runs afterward, every time a tuple is forced.

use std::rc::Rc;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    engine::Engine,
    error::{FailureKind, YamletError, YamletResult},
    ladder::{Ladder, LadderArm},
    lambda::ParamList,
    options::ConstructorStyle,
    point::SourceSpan,
    trace::Trace,
    value::{
        deferred::{CompositeItem, DeferredCell, DeferredKind},
        tuple::TupleData,
        Cell, TupleId, Value,
    },
    yaml::{RawKind, RawNode},
};

/// Parses and constructs a whole document, returning its root tuple. The
/// root is fully preprocessed (every ladder resolved, every `undefined` key
/// erased) before it is handed back, so callers never see an un-erased
/// tuple — everything nested under it stays lazy behind `PreprocessingTuple`
/// until something actually forces it.
pub(crate) fn build_document(engine: &mut Engine, raw: &RawNode, file: Rc<str>) -> YamletResult<TupleId> {
    let span = span_of(raw, &file);
    let pairs = mapping_pairs(raw, "document root")?;
    let root = build_mapping(engine, pairs, None, span, &file)?;
    let mut trace = Trace::new();
    crate::preprocess::run_erasure(engine, &mut trace, root)?;
    Ok(root)
}

fn span_of(node: &RawNode, file: &Rc<str>) -> SourceSpan {
    SourceSpan::new(file.clone(), node.start, node.end)
}

fn construction_error(msg: impl Into<String>) -> YamletError {
    YamletError::new(FailureKind::ConstructionError, msg.into())
}

fn scalar_text<'a>(node: &'a RawNode, ctx: &str) -> YamletResult<&'a str> {
    match &node.kind {
        RawKind::Scalar(s) => Ok(s.as_str()),
        _ => Err(construction_error(format!("{ctx}: expected a scalar node"))),
    }
}

fn mapping_pairs<'a>(node: &'a RawNode, ctx: &str) -> YamletResult<&'a [(RawNode, RawNode)]> {
    match &node.kind {
        RawKind::Mapping(pairs) => Ok(pairs.as_slice()),
        _ => Err(construction_error(format!("{ctx}: expected a mapping node"))),
    }
}

/// One arm accumulated while a ladder is open: its condition (`None` for
/// `!else`), and the flattened `(key, value-node, is-local)` triples pulled
/// from its body mapping. Nested directives inside an arm body (another
/// `!if` nested one level deeper) aren't supported — only plain keys and
/// `!local`-tagged keys are.
struct PendingArm {
    condition: Option<Rc<str>>,
    point: SourceSpan,
    pairs: Vec<(Rc<str>, RawNode, bool)>,
}

struct PendingLadder {
    arms: Vec<PendingArm>,
}

impl PendingLadder {
    fn push_arm(&mut self, condition: Option<Rc<str>>, point: SourceSpan, body: &RawNode) -> YamletResult<()> {
        let raw_pairs = mapping_pairs(body, "if-ladder arm body")?;
        let mut pairs = Vec::with_capacity(raw_pairs.len());
        for (k, v) in raw_pairs {
            let is_local = match k.tag.as_deref() {
                None => false,
                Some("!local") => true,
                Some(other) => {
                    return Err(construction_error(format!(
                        "nested directive `{other}` inside an if-ladder arm body is not supported"
                    )));
                }
            };
            let key = scalar_text(k, "if-ladder arm key")?;
            pairs.push((Rc::from(key), v.clone(), is_local));
        }
        self.arms.push(PendingArm { condition, point, pairs });
        Ok(())
    }
}

/// Builds one mapping node into a tuple: walks its pairs top-to-bottom,
/// opening/closing if-ladders and inserting plain/local keys, per spec §4.H.
fn build_mapping(
    engine: &mut Engine,
    pairs: &[(RawNode, RawNode)],
    parent: Option<TupleId>,
    span: SourceSpan,
    file: &Rc<str>,
) -> YamletResult<TupleId> {
    let tuple_id = engine.alloc_tuple(TupleData::new(span));
    if let Some(p) = parent {
        engine.tuple_mut(tuple_id).parent = Some(p);
    }

    let mut pending: Option<PendingLadder> = None;
    // Tracks every key seen as a *plain* (non-local) entry at this level, so
    // a `!local` key introduced by a ladder arm that collides with one can
    // be rejected once the whole mapping has been walked (spec §4.H
    // "Locals").
    let mut plain_keys: AHashSet<Rc<str>> = AHashSet::new();

    for (key_node, val_node) in pairs {
        match key_node.tag.as_deref() {
            Some("!if") => {
                close_ladder(engine, tuple_id, pending.take(), &mut plain_keys, file)?;
                let cond = scalar_text(key_node, "!if")?;
                let mut ladder = PendingLadder { arms: Vec::new() };
                ladder.push_arm(Some(Rc::from(cond)), span_of(key_node, file), val_node)?;
                pending = Some(ladder);
            }
            Some("!elif") => {
                let cond = scalar_text(key_node, "!elif")?;
                let point = span_of(key_node, file);
                let Some(p) = pending.as_mut() else {
                    return Err(construction_error("`!elif` with no preceding `!if`"));
                };
                p.push_arm(Some(Rc::from(cond)), point, val_node)?;
            }
            Some("!else") => {
                let text = scalar_text(key_node, "!else")?;
                if !text.trim().is_empty() {
                    return Err(construction_error("`!else` must have an empty scalar"));
                }
                let point = span_of(key_node, file);
                let Some(p) = pending.as_mut() else {
                    return Err(construction_error("`!else` with no preceding `!if`"));
                };
                p.push_arm(None, point, val_node)?;
            }
            Some("!local") => {
                close_ladder(engine, tuple_id, pending.take(), &mut plain_keys, file)?;
                let key = scalar_text(key_node, "key")?;
                insert_local_pair(engine, tuple_id, Rc::from(key), val_node, file)?;
            }
            _ => {
                close_ladder(engine, tuple_id, pending.take(), &mut plain_keys, file)?;
                let key = scalar_text(key_node, "key")?;
                insert_plain_pair(engine, tuple_id, Rc::from(key), val_node, file, &mut plain_keys)?;
            }
        }
    }
    close_ladder(engine, tuple_id, pending.take(), &mut plain_keys, file)?;

    let locals: Vec<Rc<str>> = engine.tuple(tuple_id).locals.iter().cloned().collect();
    for key in locals {
        if plain_keys.contains(&key) {
            return Err(construction_error(format!(
                "key `{key}` is introduced both as a plain key and as `!local` at the same level"
            )));
        }
    }
    Ok(tuple_id)
}

fn insert_plain_pair(
    engine: &mut Engine,
    tuple_id: TupleId,
    key: Rc<str>,
    val_node: &RawNode,
    file: &Rc<str>,
    plain_keys: &mut AHashSet<Rc<str>>,
) -> YamletResult<()> {
    if let Some(existing) = engine.tuple(tuple_id).cells.get(&key).cloned() {
        if is_ladder_derived(engine, &existing) {
            return Err(YamletError::new(
                FailureKind::CompositionTypeError,
                format!("plain key `{key}` collides with an if-ladder/compositor-derived chain"),
            ));
        }
        return Err(construction_error(format!("duplicate key `{key}`")));
    }
    let cell = canonicalize_cell(construct_cell(engine, val_node, tuple_id, file)?);
    engine.tuple_mut(tuple_id).cells.insert(key.clone(), cell);
    plain_keys.insert(key);
    Ok(())
}

/// True when `cell` is a deferred entry produced by the if-ladder rewrite
/// itself (`close_ladder`'s per-key item, or the `FlatCompositor` it wraps
/// a collision in) rather than an ordinary deferred value like `!expr` or
/// `!fmt`. A plain key landing on top of one of these is a composition type
/// error (spec §7), not a simple duplicate-key mistake.
fn is_ladder_derived(engine: &Engine, cell: &Cell) -> bool {
    match cell {
        Cell::Deferred(id) => matches!(engine.deferred(*id).kind, DeferredKind::IfLadderItem { .. } | DeferredKind::FlatCompositor { .. }),
        _ => false,
    }
}

/// Inserts a `!local`-tagged pair. A nested mapping value marks the whole
/// block's keys local by flattening its pairs straight into the enclosing
/// tuple rather than nesting a sub-scope; any other value shape marks just
/// that one key local (spec §4.C "`!local`: ... a single key or mapping
/// block").
fn insert_local_pair(engine: &mut Engine, tuple_id: TupleId, key: Rc<str>, val_node: &RawNode, file: &Rc<str>) -> YamletResult<()> {
    if let RawKind::Mapping(pairs) = &val_node.kind {
        for (k, v) in pairs {
            if k.tag.is_some() {
                return Err(construction_error("nested directive inside a `!local` block is not supported"));
            }
            let inner_key: Rc<str> = Rc::from(scalar_text(k, "key")?);
            if engine.tuple(tuple_id).cells.contains_key(&inner_key) {
                return Err(construction_error(format!("duplicate key `{inner_key}` inside `!local` block")));
            }
            let cell = canonicalize_cell(construct_cell(engine, v, tuple_id, file)?);
            engine.tuple_mut(tuple_id).cells.insert(inner_key.clone(), cell);
            engine.tuple_mut(tuple_id).locals.insert(inner_key);
        }
        Ok(())
    } else {
        if engine.tuple(tuple_id).cells.contains_key(&key) {
            return Err(construction_error(format!("duplicate key `{key}`")));
        }
        let cell = canonicalize_cell(construct_cell(engine, val_node, tuple_id, file)?);
        engine.tuple_mut(tuple_id).cells.insert(key.clone(), cell);
        engine.tuple_mut(tuple_id).locals.insert(key);
        Ok(())
    }
}

fn close_ladder(
    engine: &mut Engine,
    tuple_id: TupleId,
    pending: Option<PendingLadder>,
    plain_keys: &mut AHashSet<Rc<str>>,
    file: &Rc<str>,
) -> YamletResult<()> {
    let Some(pending) = pending else { return Ok(()) };
    if pending.arms.is_empty() {
        return Ok(());
    }
    let has_else = pending.arms.last().map(|a| a.condition.is_none()).unwrap_or(false);
    let ladder = Ladder {
        arms: pending.arms.iter().map(|a| LadderArm { condition: a.condition.clone(), point: a.point.clone() }).collect(),
        has_else,
    };
    let ladder_id = engine.alloc_ladder(ladder);

    let mut keys: IndexMap<Rc<str>, ()> = IndexMap::new();
    for arm in &pending.arms {
        for (k, _, _) in &arm.pairs {
            keys.entry(k.clone()).or_insert(());
        }
    }

    for key in keys.keys() {
        let mut branches = Vec::with_capacity(pending.arms.len());
        let mut any_local = false;
        for arm in &pending.arms {
            match arm.pairs.iter().find(|(k, _, _)| k == key) {
                Some((_, val_node, is_local)) => {
                    if *is_local {
                        any_local = true;
                    }
                    branches.push(canonicalize_cell(construct_cell(engine, val_node, tuple_id, file)?));
                }
                None => branches.push(Cell::undefined()),
            }
        }
        let point = engine.tuple(tuple_id).source.clone();
        let item = engine.alloc_deferred(DeferredCell::new(
            DeferredKind::IfLadderItem { ladder: ladder_id, branches },
            tuple_id,
            point,
        ));
        insert_ladder_key(engine, tuple_id, key.clone(), Cell::Deferred(item))?;
        if any_local {
            engine.tuple_mut(tuple_id).locals.insert(key.clone());
        } else {
            plain_keys.insert(key.clone());
        }
    }

    // Attach the ladder to the enclosing tuple's preprocessors eagerly, so
    // a composite that never forces this tuple's ladder-bearing keys still
    // carries the ladder forward (spec §4.G step 3 needs it present, not
    // lazily materialized on first read).
    engine.index_deferred_for(tuple_id, ladder_id);
    Ok(())
}

fn insert_ladder_key(engine: &mut Engine, tuple_id: TupleId, key: Rc<str>, new_cell: Cell) -> YamletResult<()> {
    let existing = engine.tuple(tuple_id).cells.get(&key).cloned();
    match existing {
        None => {
            engine.tuple_mut(tuple_id).cells.insert(key, new_cell);
        }
        Some(existing_cell) => {
            let point = engine.tuple(tuple_id).source.clone();
            let flat = engine.alloc_deferred(DeferredCell::new(
                DeferredKind::FlatCompositor { terms: vec![existing_cell, new_cell], var_name: key.clone() },
                tuple_id,
                point,
            ));
            engine.tuple_mut(tuple_id).cells.insert(key, Cell::Deferred(flat));
        }
    }
    Ok(())
}

/// Dispatches one value node to a cell per the tag table in spec §4.C.
/// `!local` is stripped to plain kind-based inference before this is
/// reached (handled by the caller); every other recognized tag is matched
/// here.
fn construct_cell(engine: &mut Engine, node: &RawNode, scope: TupleId, file: &Rc<str>) -> YamletResult<Cell> {
    let span = span_of(node, file);
    match node.tag.as_deref() {
        None => construct_untagged(engine, node, scope, span, file),
        Some(tag) if tag.starts_with("!!") => construct_untagged(engine, node, scope, span, file),
        Some("!import") => {
            let text = scalar_text(node, "!import")?;
            Ok(Cell::Deferred(engine.alloc_deferred(DeferredCell::new(
                DeferredKind::ImportLoad { text: Rc::from(text) },
                scope,
                span,
            ))))
        }
        Some("!composite") => {
            let items = build_composite_items(engine, node, scope, file)?;
            Ok(Cell::Deferred(engine.alloc_deferred(DeferredCell::new(DeferredKind::TupleListComposite { items }, scope, span))))
        }
        Some("!fmt") => {
            let text = scalar_text(node, "!fmt")?;
            Ok(Cell::Deferred(engine.alloc_deferred(DeferredCell::new(
                DeferredKind::StringInterpolate { text: Rc::from(text) },
                scope,
                span,
            ))))
        }
        Some("!expr") => {
            let text = scalar_text(node, "!expr")?;
            Ok(Cell::Deferred(engine.alloc_deferred(DeferredCell::new(
                DeferredKind::ExpressionEvaluate { text: Rc::from(text) },
                scope,
                span,
            ))))
        }
        Some("!lambda") => {
            let text = scalar_text(node, "!lambda")?;
            let split = find_top_level_colon(text)
                .ok_or_else(|| construction_error("`!lambda` scalar must be `params: body`"))?;
            let params_text = text[..split].trim();
            let body_text = text[split + 1..].trim();
            let params = ParamList::parse(params_text, &span)?;
            Ok(Cell::Deferred(engine.alloc_deferred(DeferredCell::new(
                DeferredKind::Lambda { params, body: Rc::from(body_text) },
                scope,
                span,
            ))))
        }
        Some("!null") => {
            require_empty_scalar(node, "!null")?;
            Ok(Cell::null())
        }
        Some("!external") => {
            require_empty_scalar(node, "!external")?;
            Ok(Cell::external())
        }
        Some("!if") | Some("!elif") | Some("!else") | Some("!local") => Err(construction_error(format!(
            "`{}` only has meaning as a mapping pair's key",
            node.tag.as_deref().unwrap_or_default()
        ))),
        Some(other) => construct_user_tag(engine, node, other, scope, span),
    }
}

fn construct_untagged(engine: &mut Engine, node: &RawNode, scope: TupleId, span: SourceSpan, file: &Rc<str>) -> YamletResult<Cell> {
    match &node.kind {
        RawKind::Mapping(pairs) => {
            let sub = build_mapping(engine, pairs, Some(scope), span.clone(), file)?;
            let deferred = engine.alloc_deferred(DeferredCell::new(DeferredKind::PreprocessingTuple { tuple: sub }, scope, span));
            Ok(Cell::Deferred(deferred))
        }
        RawKind::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(construct_value_eagerly(engine, item, scope, file)?);
            }
            Ok(Cell::Value(Value::Sequence(Rc::new(out))))
        }
        RawKind::Scalar(text) => Ok(Cell::Value(infer_scalar(text))),
    }
}

/// Canonicalizes a cell bound for a tuple's `cells` map: a plain-spelled
/// null scalar (`~`, empty, `null`) infers to `Value::Sentinel(Null)` the
/// same as any other scalar, but every consumer of the null sentinel
/// (`Cell::is_null`, `merge_one`'s nullify branch, `resolve_name`'s
/// fall-through, `get_key`'s direct-access error) matches the dedicated
/// `Cell::Sentinel(Null)` shape, not a `Value::Sentinel(Null)` boxed inside
/// `Cell::Value`. Only cells landing in a tuple's key map need this — list
/// items and other plain `Value` consumers read the sentinel as ordinary
/// data and should not error when forced.
fn canonicalize_cell(cell: Cell) -> Cell {
    match cell {
        Cell::Value(Value::Sentinel(crate::value::Sentinel::Null)) => Cell::null(),
        other => other,
    }
}

/// Builds a sequence *item* all the way down to a `Value` rather than a
/// `Cell`: list literals in the tag table are always eagerly-held data, so
/// a nested untagged mapping inside one still needs its own preprocessing
/// deferred resolved immediately (there is nowhere lazy to park it).
fn construct_value_eagerly(engine: &mut Engine, node: &RawNode, scope: TupleId, file: &Rc<str>) -> YamletResult<Value> {
    let cell = construct_cell(engine, node, scope, file)?;
    let mut trace = Trace::new();
    engine.force_cell(&mut trace, &cell)
}

fn require_empty_scalar(node: &RawNode, tag: &str) -> YamletResult<()> {
    match &node.kind {
        RawKind::Scalar(s) if s.trim().is_empty() => Ok(()),
        _ => Err(construction_error(format!("`{tag}` must have an empty scalar"))),
    }
}

fn build_composite_items(engine: &mut Engine, node: &RawNode, scope: TupleId, file: &Rc<str>) -> YamletResult<Vec<CompositeItem>> {
    match &node.kind {
        RawKind::Scalar(text) => Ok(text.split_whitespace().map(|s| CompositeItem::Name(Rc::from(s))).collect()),
        RawKind::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match (&item.kind, item.tag.as_deref()) {
                    (RawKind::Scalar(text), None) => out.push(CompositeItem::Name(Rc::from(text.trim()))),
                    _ => {
                        let cell = construct_cell(engine, item, scope, file)?;
                        out.push(CompositeItem::Nested(Box::new(cell)));
                    }
                }
            }
            Ok(out)
        }
        _ => Err(construction_error("`!composite` must be a scalar or a sequence")),
    }
}

fn construct_user_tag(engine: &mut Engine, node: &RawNode, tag: &str, scope: TupleId, span: SourceSpan) -> YamletResult<Cell> {
    let (base_tag, style_override) = split_style_suffix(tag);
    let Some(ctor) = engine.options().constructors.get(base_tag).cloned() else {
        return Err(construction_error(format!("unknown tag `{tag}`")));
    };
    let style = style_override.unwrap_or(ctor.default_style);
    let text = scalar_text(node, tag)?;
    let mut trace = Trace::new();
    let pre = match style {
        ConstructorStyle::Raw => Value::Str(Rc::from(text)),
        ConstructorStyle::Scalar => infer_scalar(text),
        ConstructorStyle::Fmt => {
            let s = crate::expr::interpolate(engine, &mut trace, text, scope, span.clone())?;
            Value::Str(Rc::from(s))
        }
        ConstructorStyle::Expr => crate::expr::eval_text(engine, &mut trace, text, scope, span.clone())?,
    };
    let rendered = match &pre {
        Value::Str(s) => s.to_string(),
        other => crate::expr::eval::stringify(engine, other),
    };
    let value = (ctor.build)(&rendered, style)?;
    Ok(Cell::Value(value))
}

/// Splits `!tag:fmt` / `!tag:expr` / `!tag:raw` into the registered tag name
/// and the style override it requests, if any (spec §4.C "User tag" row).
fn split_style_suffix(tag: &str) -> (&str, Option<ConstructorStyle>) {
    if let Some(idx) = tag.rfind(':') {
        match &tag[idx + 1..] {
            "fmt" => return (&tag[..idx], Some(ConstructorStyle::Fmt)),
            "expr" => return (&tag[..idx], Some(ConstructorStyle::Expr)),
            "raw" => return (&tag[..idx], Some(ConstructorStyle::Raw)),
            _ => {}
        }
    }
    (tag, None)
}

fn find_top_level_colon(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    for (i, c) in text.char_indices() {
        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Infers a scalar's type the way YAML's core schema would (spec §4.C):
/// `null`/empty, booleans, ints (including `0x`-prefixed hex), floats, else
/// a plain string.
fn infer_scalar(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "~" || trimmed.eq_ignore_ascii_case("null") {
        return Value::Sentinel(crate::value::Sentinel::Null);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Value::Int(i);
        }
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Str(Rc::from(text))
}
