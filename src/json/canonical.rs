//! JSON canonicalization for content comparison and condensing.
//!
//! The canonical form of an object drops the configured top-level fields and
//! renders every remaining object with keys in ascending order, recursively.
//! Anything that is not a top-level object (arrays, scalars, unparseable
//! text) canonicalizes to itself.

use std::collections::HashSet;

use serde_json::Value;

/// Fast structural check: the first non-whitespace character is `{` or `[`.
/// Costs only the leading whitespace; never parses.
pub fn looks_like_json(content: &str) -> bool {
    matches!(
        content.trim_start().as_bytes().first(),
        Some(b'{') | Some(b'[')
    )
}

/// Whether the content parses as a JSON document.
pub fn is_valid_json(content: &str) -> bool {
    !content.trim().is_empty() && serde_json::from_str::<Value>(content).is_ok()
}

/// Canonical key for `content`: top-level excluded fields removed, object
/// keys sorted at every level. Non-object or unparseable content is returned
/// verbatim.
pub fn normalize_excluding_fields(content: &str, exclude_fields: &HashSet<String>) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(mut map)) => {
            for field in exclude_fields {
                map.remove(field);
            }
            canonical_string(&Value::Object(map))
        }
        _ => content.to_string(),
    }
}

/// Deterministic rendering with object members in key-ascending order at
/// every nesting level. Array element order is preserved.
pub fn canonical_string(value: &Value) -> String {
    sorted_value(value).to_string()
}

fn sorted_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (key, child) in entries {
                sorted.insert(key.clone(), sorted_value(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_value).collect()),
        other => other.clone(),
    }
}

/// Textual form of a top-level scalar field, or `None` when the content does
/// not parse, the field is absent, or the field is an object/array.
pub fn extract_field(content: &str, field_name: &str) -> Option<String> {
    let value: Value = serde_json::from_str(content).ok()?;
    match value.get(field_name)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}
