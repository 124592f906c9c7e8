//! Lambda calling convention (spec §4.B "Lambda", §6 "Host function table").
//!
//! Grounded on `signature.rs`'s parameter binding, simplified to the shape
//! `!lambda` scalars actually need: a flat list of positional-or-keyword
//! parameters, each with an optional default expression, no `*args`/`**kwargs`
//! varargs (the expression grammar has no syntax to populate them with).

use std::rc::Rc;

use crate::{
    error::{FailureKind, YamletError, YamletResult},
    point::SourceSpan,
    value::TupleId,
};

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<str>,
    /// Source text of the default value expression, evaluated in the
    /// lambda's defining scope if the caller doesn't supply this argument.
    pub default: Option<Rc<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct ParamList(pub Vec<Param>);

impl ParamList {
    /// Parses the `params` half of a `!lambda 'params: body'` scalar:
    /// comma-separated names, each optionally followed by `=default-expr`.
    pub fn parse(text: &str, point: &SourceSpan) -> YamletResult<Self> {
        let mut params = Vec::new();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self(params));
        }
        for part in split_top_level_commas(trimmed) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some(eq) = find_top_level_eq(part) {
                let name = part[..eq].trim();
                let default = part[eq + 1..].trim();
                params.push(Param { name: Rc::from(name), default: Some(Rc::from(default)) });
            } else {
                params.push(Param { name: Rc::from(part), default: None });
            }
        }
        let _ = point;
        Ok(Self(params))
    }

    pub fn names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.0.iter().map(|p| &p.name)
    }
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn find_top_level_eq(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                // avoid matching `==`
                if bytes.get(i + 1) != Some(&b'=') && (i == 0 || bytes[i - 1] != b'=') {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// A lambda definition stored in the arena.
#[derive(Debug, Clone)]
pub struct LambdaDef {
    pub params: ParamList,
    pub body: Rc<str>,
    /// The scope the lambda closes over; argument bindings are layered on
    /// top of a child of this scope at call time.
    pub closure: TupleId,
    pub point: SourceSpan,
}

/// Matches positional and named call arguments against `params`, returning
/// `(name, supplied-or-default-needed)` pairs in parameter order. Extra
/// positional args or unknown keyword args are a lambda-call error (spec
/// §7's "Lambda call error").
pub fn bind_positions(
    params: &ParamList,
    positional: &[crate::value::Value],
    kwargs: &[(Rc<str>, crate::value::Value)],
) -> YamletResult<Vec<(Rc<str>, Option<crate::value::Value>)>> {
    if positional.len() > params.0.len() {
        return Err(YamletError::new(
            FailureKind::LambdaCallError,
            format!("too many positional arguments: got {}, expected at most {}", positional.len(), params.0.len()),
        ));
    }
    let mut bound: Vec<(Rc<str>, Option<crate::value::Value>)> =
        params.0.iter().map(|p| (p.name.clone(), None)).collect();
    for (slot, value) in bound.iter_mut().zip(positional.iter()) {
        slot.1 = Some(value.clone());
    }
    for (name, value) in kwargs {
        let Some(slot) = bound.iter_mut().find(|(n, _)| n == name) else {
            return Err(YamletError::new(FailureKind::LambdaCallError, format!("unknown keyword argument `{name}`")));
        };
        if slot.1.is_some() {
            return Err(YamletError::new(
                FailureKind::LambdaCallError,
                format!("argument `{name}` supplied both positionally and by keyword"),
            ));
        }
        slot.1 = Some(value.clone());
    }
    Ok(bound)
}
