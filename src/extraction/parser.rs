//! Layered decoding of extraction-model responses.
//!
//! Models wrap their JSON in prose, code fences, or both, and the wrapping
//! varies call to call. Decoding runs in layers: strict parse of the whole
//! response, then the span from the first `{` to the last `}`, then the
//! contents of fenced code blocks. The first candidate that decodes to a
//! value with the expected shape wins.

use crate::error::{NovelGraphError, Result};
use crate::extraction::{CharacterSketch, GraphPayload};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("Invalid regex"))
}

/// Layer 1: the whole response is JSON.
fn strict_json(content: &str) -> Option<Value> {
    serde_json::from_str(content.trim()).ok()
}

/// Layer 2: JSON surrounded by prose; take first `{` to last `}`.
fn brace_span(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

/// Layer 3: JSON inside fenced code blocks; try each block in turn.
fn fenced_blocks(content: &str) -> Vec<Value> {
    fence_regex()
        .captures_iter(content)
        .filter_map(|cap| serde_json::from_str(cap.get(1)?.as_str()).ok())
        .collect()
}

fn candidates(content: &str) -> Vec<Value> {
    let mut out = Vec::new();
    if let Some(v) = strict_json(content) {
        out.push(v);
    }
    if let Some(v) = brace_span(content) {
        out.push(v);
    }
    out.extend(fenced_blocks(content));
    out
}

/// Decode a relationship-graph payload. Requires both `nodes` and `edges`
/// keys so a stray JSON object in surrounding prose is not mistaken for the
/// payload.
pub fn parse_graph_payload(content: &str) -> Result<GraphPayload> {
    for value in candidates(content) {
        if value.get("nodes").is_some() && value.get("edges").is_some() {
            if let Ok(payload) = serde_json::from_value::<GraphPayload>(value) {
                return Ok(payload);
            }
        }
    }
    Err(NovelGraphError::Parse(
        "No graph payload found in extraction response".to_string(),
    ))
}

/// Decode a character-sketch list, accepted either as a bare array or under
/// a `characters` key.
pub fn parse_character_sketches(content: &str) -> Result<Vec<CharacterSketch>> {
    for value in candidates(content) {
        let list = match &value {
            Value::Array(_) => value.clone(),
            Value::Object(map) => match map.get("characters") {
                Some(inner @ Value::Array(_)) => inner.clone(),
                _ => continue,
            },
            _ => continue,
        };
        if let Ok(sketches) = serde_json::from_value::<Vec<CharacterSketch>>(list) {
            return Ok(sketches);
        }
    }
    Err(NovelGraphError::Parse(
        "No character list found in extraction response".to_string(),
    ))
}
