//! Bounded renderings of untrusted error payloads.
//!
//! Upstream nodes attach arbitrary JSON to their errors (revert data, raw
//! call objects, whole debug dumps). Everything that ends up in a log line
//! or inside a settled error must be cut down to a bounded size first, and
//! nothing here may serialize an unbounded payload just to measure it.

use crate::types::RpcErrorObject;
use serde_json::Value;
use std::fmt::Write;

/// Default byte budget for sanitized text.
pub const DEFAULT_TEXT_LIMIT: usize = 256;

const MAX_DEPTH: usize = 4;
const MAX_ITEMS: usize = 8;
const INLINE_STRING_LIMIT: usize = 64;

/// Truncates on a char boundary, annotating with the original size.
#[must_use]
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_owned();
    }
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...({} bytes total)", &text[..cut], text.len())
}

/// Renders a JSON value into a bounded, human-readable summary. Depth,
/// element count, and inline string length are all capped, so the output
/// stays small no matter what the upstream sent.
#[must_use]
pub fn compact_value(value: &Value) -> String {
    let mut out = String::new();
    write_compact(value, 0, &mut out);
    out
}

fn write_compact(value: &Value, depth: usize, out: &mut String) {
    if depth >= MAX_DEPTH {
        out.push('…');
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => {
            let _ = write!(out, "{flag}");
        }
        Value::Number(number) => {
            let _ = write!(out, "{number}");
        }
        Value::String(text) => {
            let _ = write!(out, "{:?}", truncate_text(text, INLINE_STRING_LIMIT));
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().take(MAX_ITEMS).enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_compact(item, depth + 1, out);
            }
            if items.len() > MAX_ITEMS {
                let _ = write!(out, ", …{} more", items.len() - MAX_ITEMS);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (index, (key, item)) in map.iter().take(MAX_ITEMS).enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", truncate_text(key, INLINE_STRING_LIMIT));
                write_compact(item, depth + 1, out);
            }
            if map.len() > MAX_ITEMS {
                let _ = write!(out, ", …{} more", map.len() - MAX_ITEMS);
            }
            out.push('}');
        }
    }
}

/// Approximate serialized size, abandoning the count once it passes
/// `budget`. Never allocates.
fn weigh(value: &Value, budget: usize) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 12,
        Value::String(text) => text.len() + 2,
        Value::Array(items) => {
            let mut total = 2;
            for item in items {
                total += weigh(item, budget) + 1;
                if total > budget {
                    return total;
                }
            }
            total
        }
        Value::Object(map) => {
            let mut total = 2;
            for (key, item) in map {
                total += key.len() + 4 + weigh(item, budget);
                if total > budget {
                    return total;
                }
            }
            total
        }
    }
}

/// Walks an error's source chain into one bounded line.
#[must_use]
pub fn describe_error(error: &(dyn std::error::Error + 'static)) -> String {
    let mut line = truncate_text(&error.to_string(), DEFAULT_TEXT_LIMIT);
    let mut source = error.source();
    let mut hops = 0;
    while let Some(cause) = source {
        if hops == MAX_DEPTH {
            line.push_str(": …");
            break;
        }
        let _ = write!(line, ": {}", truncate_text(&cause.to_string(), DEFAULT_TEXT_LIMIT));
        source = cause.source();
        hops += 1;
    }
    line
}

/// Truncates the heavy fields of a JSON-RPC error in place before it is
/// surfaced to a caller: the message is cut to the text limit, and `data`
/// heavier than the limit is replaced by its compact rendering.
pub fn truncate_error_object(error: &mut RpcErrorObject) {
    if error.message.len() > DEFAULT_TEXT_LIMIT {
        error.message = truncate_text(&error.message, DEFAULT_TEXT_LIMIT);
    }
    if let Some(data) = &error.data {
        if weigh(data, DEFAULT_TEXT_LIMIT) > DEFAULT_TEXT_LIMIT {
            error.data = Some(Value::String(compact_value(data)));
        }
    }
}
