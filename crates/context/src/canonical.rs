//! Canonical form of rules/settings payloads for stable-prefix hashing.
//!
//! Two payloads that differ only in object key order, in the order of a
//! `constraints` array, or in volatile fields canonicalize identically.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Keys removed at any depth before hashing.
pub const VOLATILE_KEYS: [&str; 3] = ["timestamp", "nonce", "requestId"];

/// Key whose array value is an unordered set.
const UNORDERED_ARRAY_KEY: &str = "constraints";

/// Canonicalize a JSON value: sorted keys, volatile keys stripped,
/// `constraints` arrays sorted.
pub fn canonicalize(value: &Value) -> Value {
    canonicalize_under(value, None)
}

fn canonicalize_under(value: &Value, parent_key: Option<&str>) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items
                .iter()
                .map(|item| canonicalize_under(item, parent_key))
                .collect();
            if parent_key == Some(UNORDERED_ARRAY_KEY) {
                items.sort_by(compare_set_members);
            }
            Value::Array(items)
        }
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields
                .keys()
                .filter(|key| !VOLATILE_KEYS.contains(&key.as_str()))
                .collect();
            keys.sort();

            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize_under(&fields[key], Some(key)));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// `id` ascending, then `priority` descending, then canonical text.
fn compare_set_members(left: &Value, right: &Value) -> Ordering {
    let id = |v: &Value| v.get("id").map(id_text).unwrap_or_default();
    let priority = |v: &Value| {
        v.get("priority")
            .and_then(Value::as_f64)
            .unwrap_or(f64::NEG_INFINITY)
    };

    id(left)
        .cmp(&id(right))
        .then_with(|| priority(right).total_cmp(&priority(left)))
        .then_with(|| canonical_json(left).cmp(&canonical_json(right)))
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compact JSON text of an already-canonical value.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Canonical form of one layer's text.
///
/// Text that looks like a JSON object or array and parses is
/// canonicalized; anything else is trimmed and kept as a string.
pub fn canonicalize_layer(content: &str) -> Value {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }

    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !looks_like_json {
        return Value::String(trimmed.to_string());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(parsed) => canonicalize(&parsed),
        Err(_) => Value::String(trimmed.to_string()),
    }
}
