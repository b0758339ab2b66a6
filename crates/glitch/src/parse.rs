//! Turning raw model output into displayable rules.
//!
//! The generation endpoint is asked for a JSON array of strings but is not
//! bound to return one, so parsing is two-tier: strict JSON first, then a
//! newline-delimited fallback. Individual elements are sanitized to plain
//! text or replaced with a placeholder.

use serde_json::{Map, Value};

use crate::messages::Messages;

/// Reply the model gives when it does not know the requested game.
pub const UNKNOWN_GAME_SENTINEL: &str = "UNKNOWN_GAME";

/// Rules at or above this many characters are discarded.
pub const MAX_RULE_CHARS: usize = 200;

/// Fallback lines must be longer than this to count as a rule.
const FALLBACK_MIN_CHARS: usize = 5;

/// Fallback parsing keeps at most this many lines.
const FALLBACK_MAX_LINES: usize = 10;

/// Field names a structured element may carry its text under, in priority order.
const FIELD_ALIASES: [&str; 5] = ["rule", "text", "description", "rule_name", "content"];

/// Result of parsing one generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Rules(Vec<String>),
    /// The model answered with the unknown-game sentinel.
    UnknownGame,
}

/// Remove markdown code-fence markers and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Reduce one array element to rule text.
pub fn sanitize_rule(item: &Value, messages: &Messages) -> String {
    match item {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => {
            let chosen = FIELD_ALIASES
                .iter()
                .filter_map(|key| map.get(*key))
                .find(|v| is_populated(v))
                .or_else(|| first_value(map));
            match chosen {
                Some(Value::String(s)) => s.trim().to_string(),
                _ => messages.corrupt_rule.to_string(),
            }
        }
        _ => messages.data_error.to_string(),
    }
}

/// First value in object enumeration order: array-index keys ascending,
/// then the remaining keys in insertion order.
fn first_value(map: &Map<String, Value>) -> Option<&Value> {
    map.iter()
        .filter_map(|(key, value)| array_index(key).map(|i| (i, value)))
        .min_by_key(|(i, _)| *i)
        .map(|(_, value)| value)
        .or_else(|| map.values().next())
}

/// Canonical array index: decimal, no leading zeros, below 2^32 - 1.
fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|i| *i != u32::MAX)
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_displayable(rule: &str) -> bool {
    let len = rule.chars().count();
    len > 0 && len < MAX_RULE_CHARS
}

/// Parse a full response body.
pub fn parse_batch(raw: &str, messages: &Messages) -> BatchOutcome {
    let text = strip_code_fences(raw);

    if text.contains(UNKNOWN_GAME_SENTINEL) {
        tracing::info!("Model did not recognise the game");
        return BatchOutcome::UnknownGame;
    }

    let rules = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => items
            .iter()
            .map(|item| sanitize_rule(item, messages))
            .filter(|rule| is_displayable(rule))
            .collect(),
        Ok(other) => {
            tracing::warn!("Response is JSON but not an array: {}", json_kind(&other));
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("JSON parsing failed, using line fallback: {e}");
            split_lines(&text)
        }
    };

    BatchOutcome::Rules(rules)
}

/// Newline-delimited fallback for bodies that are not JSON.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| {
            let len = line.chars().count();
            len > FALLBACK_MIN_CHARS && len < MAX_RULE_CHARS
        })
        .take(FALLBACK_MAX_LINES)
        .map(str::to_string)
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
