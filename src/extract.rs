//! Field lookup over command responses
//!
//! The player answers every command with an array of small JSON objects whose
//! shape varies from verb to verb. Rather than binding to a fixed envelope,
//! callers ask for a field by name and get the first occurrence found by a
//! depth-first walk of the tree.
//!
//! ```text
//! [{"state": "playing"}, {"track": {"link": "spotify:track:1", "duration": 1000}}]
//!        find_field(.., "link") -> "spotify:track:1"
//! ```

use serde_json::Value;

/// Depth-first, pre-order search for `name`.
///
/// Object keys are visited in the order the server sent them. A key that
/// matches wins before its siblings' subtrees are searched; a key that does
/// not match has its own subtree searched before the next sibling.
pub fn find_field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == name {
                    return Some(child);
                }
                if let Some(found) = find_field(child, name) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_field(item, name)),
        _ => None,
    }
}

/// Look up `name`, returning `default` when the field is absent or the
/// response is null/empty. An explicit JSON `null` counts as absent.
pub fn extract_or(response: &Value, name: &str, default: Value) -> Value {
    find_field(response, name)
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or(default)
}

/// String-valued field, or `default`.
pub fn extract_str<'a>(response: &'a Value, name: &str, default: &'a str) -> &'a str {
    find_field(response, name)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

/// Integer field. Accepts JSON numbers (rounded) and numeric strings, since
/// the player is not consistent about which it sends.
pub fn extract_i64(response: &Value, name: &str) -> Option<i64> {
    find_field(response, name).and_then(value_as_i64)
}

pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Stringify a scalar identifier (numbers and strings both occur).
pub(crate) fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
