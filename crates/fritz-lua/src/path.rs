//! Dotted path selection over `data.lua` JSON documents.
//!
//! Supported syntax: object keys, numeric array indexes and `#`. A trailing
//! `#` yields the array length; `#` followed by more segments maps the rest
//! of the path over every element.

use serde_json::Value;

/// Select the node at `path`; an empty path selects the whole document.
pub fn select(root: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(root.clone());
    }
    let segments: Vec<&str> = path.split('.').collect();
    select_segments(root, &segments)
}

fn select_segments(node: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(node.clone());
    };
    match node {
        Value::Array(items) if *head == "#" => {
            if rest.is_empty() {
                Some(Value::from(items.len()))
            } else {
                Some(Value::Array(
                    items
                        .iter()
                        .filter_map(|item| select_segments(item, rest))
                        .collect(),
                ))
            }
        }
        Value::Array(items) => head
            .parse::<usize>()
            .ok()
            .and_then(|idx| items.get(idx))
            .and_then(|item| select_segments(item, rest)),
        Value::Object(map) => map.get(*head).and_then(|item| select_segments(item, rest)),
        _ => None,
    }
}

/// Numeric reading of a node: numbers as is, numeric strings parsed,
/// booleans 1/0, anything else 0.
pub fn as_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}

/// Text reading of a node used for labels; `null` becomes empty.
pub fn as_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
