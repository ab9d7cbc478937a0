//! Dotted-path access over provider responses
//!
//! Paths look like `Status.Timeline.CreationDateTime` or
//! `TagDescriptions.0.Tags`. In item-extraction paths a `*` segment flattens
//! an array, e.g. `Reservations.*.Instances`.

use serde_json::{Map, Value};

/// Resolve a dotted path
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }

    match current {
        Value::Null => None,
        v => Some(v),
    }
}

/// Resolve a dotted path to a string (numbers and booleans are rendered)
pub fn lookup_str(value: &Value, path: &str) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Write `new_value` at a dotted path, creating intermediate objects
pub fn set_path(target: &mut Value, path: &str, new_value: Value) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    let mut parts = path.split('.').peekable();
    let mut current = target;

    while let Some(part) = parts.next() {
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), new_value);
            return;
        }
        let entry = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry;
    }
}

/// Extract the list of items from a response
///
/// An empty path means the response itself is the list (or a single record).
/// A missing key yields no items. A key that holds a single record yields
/// that record.
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    let segments: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    };

    let mut current = vec![response.clone()];
    for segment in segments {
        let mut next = Vec::new();
        for node in current {
            if segment == "*" {
                if let Value::Array(arr) = node {
                    next.extend(arr);
                }
            } else if let Some(child) = lookup(&node, segment) {
                next.push(child.clone());
            }
        }
        current = next;
    }

    current
        .into_iter()
        .flat_map(|node| match node {
            Value::Array(arr) => arr,
            Value::Null => Vec::new(),
            single => vec![single],
        })
        .collect()
}

/// Replace `{account_id}` and `{region}` inside string parameters
pub fn substitute_params(params: &Value, account_id: &str, region: &str) -> Value {
    match params {
        Value::String(s) => Value::String(
            s.replace("{account_id}", account_id)
                .replace("{region}", region),
        ),
        Value::Array(arr) => Value::Array(
            arr.iter()
                .map(|v| substitute_params(v, account_id, region))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_params(v, account_id, region)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Shallow-merge the keys of `extra` into `target`
pub fn merge_into(target: &mut Map<String, Value>, extra: &Value) {
    if let Value::Object(map) = extra {
        for (k, v) in map {
            target.insert(k.clone(), v.clone());
        }
    }
}
