//! Tag Codec
//!
//! Converts between the canonical tag map and the wire shapes providers use.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical tag form
pub type Tags = BTreeMap<String, String>;

/// Tag payload shapes found on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagWireShape {
    /// `[{"Key": k, "Value": v}]`
    KvListUpper,
    /// `[{"key": k, "value": v}]`
    KvListLower,
    /// `[{"TagKey": k, "TagValue": v}]`
    KvListTagkey,
    /// `{k: v}`
    Dict,
}

impl TagWireShape {
    pub const ALL: [TagWireShape; 4] = [
        TagWireShape::KvListUpper,
        TagWireShape::KvListLower,
        TagWireShape::KvListTagkey,
        TagWireShape::Dict,
    ];

    /// Field names of a key/value list entry
    fn entry_fields(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::KvListUpper => Some(("Key", "Value")),
            Self::KvListLower => Some(("key", "value")),
            Self::KvListTagkey => Some(("TagKey", "TagValue")),
            Self::Dict => None,
        }
    }
}

/// Key-only forms accepted by remove operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyForm {
    /// `["k1", "k2"]`
    #[default]
    Strings,
    /// `[{"Key": "k1"}]`
    KeyObjects,
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode a tag payload into the canonical form
///
/// A missing (null) payload decodes to an empty map.
pub fn decode(payload: &Value, shape: TagWireShape) -> Result<Tags> {
    let mut tags = Tags::new();

    match (shape.entry_fields(), payload) {
        (_, Value::Null) => {}
        (None, Value::Object(map)) => {
            for (key, value) in map {
                tags.insert(key.clone(), scalar_to_string(value));
            }
        }
        (Some((key_field, value_field)), Value::Array(entries)) => {
            for entry in entries {
                let Some(key) = entry.get(key_field).and_then(|k| k.as_str()) else {
                    return Err(EngineError::catalog(format!(
                        "Tag entry without '{}' field: {}",
                        key_field, entry
                    )));
                };
                let value = entry.get(value_field).map(scalar_to_string).unwrap_or_default();
                tags.insert(key.to_string(), value);
            }
        }
        (_, other) => {
            return Err(EngineError::catalog(format!(
                "Tag payload does not match shape {:?}: {}",
                shape, other
            )));
        }
    }

    Ok(tags)
}

/// Encode canonical tags into the shape an apply operation expects
pub fn encode(tags: &Tags, shape: TagWireShape) -> Value {
    match shape.entry_fields() {
        None => Value::Object(
            tags.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<Map<String, Value>>(),
        ),
        Some((key_field, value_field)) => Value::Array(
            tags.iter()
                .map(|(k, v)| {
                    let mut entry = Map::new();
                    entry.insert(key_field.to_string(), Value::String(k.clone()));
                    entry.insert(value_field.to_string(), Value::String(v.clone()));
                    Value::Object(entry)
                })
                .collect(),
        ),
    }
}

/// Encode tag keys into the form a remove operation expects
pub fn encode_keys<'a, I>(keys: I, form: KeyForm) -> Value
where
    I: IntoIterator<Item = &'a String>,
{
    Value::Array(
        keys.into_iter()
            .map(|k| match form {
                KeyForm::Strings => Value::String(k.clone()),
                KeyForm::KeyObjects => serde_json::json!({ "Key": k }),
            })
            .collect(),
    )
}

/// Decode a key-only payload back into a key set
pub fn decode_keys(payload: &Value) -> Result<BTreeSet<String>> {
    let Value::Array(entries) = payload else {
        return Err(EngineError::catalog(format!(
            "Tag key payload is not a list: {}",
            payload
        )));
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(s) => Ok(s.clone()),
            Value::Object(obj) => obj
                .get("Key")
                .and_then(|k| k.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| EngineError::catalog(format!("Tag key entry without 'Key': {}", entry))),
            other => Err(EngineError::catalog(format!("Unexpected tag key entry: {}", other))),
        })
        .collect()
}

/// Tags declared by the user for a tagging job
///
/// Keeps first-seen key order; a repeated key keeps its position and takes
/// the later value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pairs: Vec<(String, String)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair, replacing the value of an existing key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.pairs.iter().map(|(k, _)| k)
    }

    /// Canonical map of the declared pairs
    pub fn to_tags(&self) -> Tags {
        self.pairs.iter().cloned().collect()
    }

    /// Canonical map with every declared key bound to an empty value
    pub fn to_empty_values(&self) -> Tags {
        self.pairs
            .iter()
            .map(|(k, _)| (k.clone(), String::new()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut set = TagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Parse `"k1:v1,k2:v2"` into a tag set
///
/// Entries are split on `,` and then once on the first `:`; keys and values
/// are trimmed. Entries without a colon (or with an empty key) are skipped.
pub fn parse_declared_tags(input: &str) -> TagSet {
    let mut set = TagSet::new();

    for entry in input.split(',') {
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        set.insert(key, value.trim());
    }

    set
}
