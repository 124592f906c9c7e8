//! `yaml-rust2`-backed implementation of the [`crate::yaml::RawNode`]
//! contract.
//!
//! Builds the tree from the low-level event stream (`MarkedEventReceiver`)
//! rather than the crate's higher-level `Yaml` enum, because the higher
//! level loses exactly the thing the tag-constructor layer (spec §4.C)
//! needs: the explicit tag attached to each node.

use std::sync::OnceLock;

use regex::Regex;
use yaml_rust2::{
    parser::{Event, MarkedEventReceiver, Parser},
    scanner::{Marker, TokenType},
};

use crate::{
    error::{FailureKind, YamletError, YamletResult},
    point::SourcePoint,
    yaml::{RawKind, RawNode},
};

/// Rewrites stand-alone `!else:` lines to `!else ` (spec §4.C "YAML-level
/// workaround"): YAML treats a trailing colon as a tag-plus-key-begin, not
/// as part of the tag, so `!else:` alone on a line must be rewritten before
/// the parser ever sees it. Bounded to lines that are *only* `!else:`
/// (optionally indented/trailing-spaced) so it never touches a genuine
/// mapping key that merely starts with that text.
fn rewrite_else_colon(input: &str) -> String {
    static ELSE_COLON: OnceLock<Regex> = OnceLock::new();
    let re = ELSE_COLON.get_or_init(|| Regex::new(r"(?m)^([ \t]*)!else:[ \t]*$").unwrap());
    re.replace_all(input, "$1!else ").into_owned()
}

fn marker_to_point(marker: Marker) -> SourcePoint {
    // yaml-rust2 markers are 0-based; source positions elsewhere in the
    // engine are 1-based to match editor conventions.
    SourcePoint::new(marker.line() as u32, marker.col() as u32 + 1)
}

fn tag_string(tag: &Option<TokenType>) -> Option<String> {
    match tag {
        Some(TokenType::Tag(handle, suffix)) => Some(format!("{handle}{suffix}")),
        _ => None,
    }
}

enum Building {
    Sequence { items: Vec<RawNode>, start: SourcePoint },
    Mapping { pairs: Vec<(RawNode, RawNode)>, pending_key: Option<RawNode>, start: SourcePoint },
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Building>,
    finished: Vec<RawNode>,
    error: Option<YamletError>,
}

impl TreeBuilder {
    fn push_node(&mut self, node: RawNode) {
        match self.stack.last_mut() {
            Some(Building::Sequence { items, .. }) => items.push(node),
            Some(Building::Mapping { pairs, pending_key, .. }) => {
                if let Some(key) = pending_key.take() {
                    pairs.push((key, node));
                } else {
                    *pending_key = Some(node);
                }
            }
            None => self.finished.push(node),
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        let point = marker_to_point(mark);
        match ev {
            Event::StreamStart | Event::StreamEnd | Event::DocumentStart | Event::DocumentEnd => {}
            Event::Alias(_) => {
                self.error = Some(YamletError::new(
                    FailureKind::ConstructionError,
                    "YAML aliases are not supported".to_owned(),
                ));
            }
            Event::Scalar(text, _style, _aid, tag) => {
                let node = RawNode::scalar(text, tag_string(&tag), point.clone(), point);
                self.push_node(node);
            }
            Event::SequenceStart(_aid, _tag) => {
                self.stack.push(Building::Sequence { items: Vec::new(), start: point });
            }
            Event::SequenceEnd => {
                if let Some(Building::Sequence { items, start }) = self.stack.pop() {
                    self.push_node(RawNode { kind: RawKind::Sequence(items), tag: None, start, end: point });
                }
            }
            Event::MappingStart(_aid, _tag) => {
                self.stack.push(Building::Mapping { pairs: Vec::new(), pending_key: None, start: point });
            }
            Event::MappingEnd => {
                if let Some(Building::Mapping { pairs, start, pending_key }) = self.stack.pop() {
                    if pending_key.is_some() {
                        self.error = Some(YamletError::new(
                            FailureKind::ConstructionError,
                            "mapping has a key with no value".to_owned(),
                        ));
                        return;
                    }
                    self.push_node(RawNode { kind: RawKind::Mapping(pairs), tag: None, start, end: point });
                }
            }
        }
    }
}

/// Parses a document's text into a [`RawNode`] tree. `file` names the
/// document for source spans produced downstream.
pub fn parse_document(text: &str) -> YamletResult<RawNode> {
    let rewritten = rewrite_else_colon(text);
    let mut parser = Parser::new(rewritten.chars());
    let mut builder = TreeBuilder::default();
    parser.load(&mut builder, false).map_err(|e| {
        YamletError::new(FailureKind::ConstructionError, format!("YAML parse error: {e}"))
    })?;
    if let Some(err) = builder.error {
        return Err(err);
    }
    builder.finished.pop().ok_or_else(|| {
        YamletError::new(FailureKind::ConstructionError, "document has no content".to_owned())
    })
}
