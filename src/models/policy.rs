//! Policy document wrapper

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// An access-control policy document as parsed from disk.
///
/// The document is kept opaque: rules decide which fields matter. Only `id`,
/// `displayName` and `state` have convenience accessors because the engine
/// and report need them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Policy {
    document: Map<String, JsonValue>,
}

impl Policy {
    /// Wrap an already parsed JSON object
    pub fn new(document: Map<String, JsonValue>) -> Self {
        Self { document }
    }

    /// Parse a policy from raw JSON text. The top level must be an object.
    pub fn from_json_str(content: &str) -> Result<Self, PolicyParseError> {
        let value: JsonValue = serde_json::from_str(content)?;
        match value {
            JsonValue::Object(document) => Ok(Self { document }),
            other => Err(PolicyParseError::NotAnObject(json_kind(&other))),
        }
    }

    /// Policy identifier, empty when absent or not a string
    pub fn id(&self) -> &str {
        self.str_field("id")
    }

    /// Human-readable policy name, empty when absent or not a string
    pub fn display_name(&self) -> &str {
        self.str_field("displayName")
    }

    /// Policy state (`enabled`, `disabled`, ...), if present
    pub fn state(&self) -> Option<&str> {
        self.document.get("state").and_then(|v| v.as_str())
    }

    /// Top-level field lookup
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.document.get(key)
    }

    /// Dotted path lookup, e.g. `conditions.users.includeUsers`
    pub fn get_path(&self, path: &str) -> Option<&JsonValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.document.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// String items of an array at a dotted path; empty when missing
    pub fn string_list(&self, path: &str) -> Vec<&str> {
        self.get_path(path)
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
            .unwrap_or_default()
    }

    /// Whether a top-level key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.document.contains_key(key)
    }

    /// Underlying JSON object
    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.document
    }

    fn str_field(&self, key: &str) -> &str {
        self.document
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }
}

/// Reasons a policy document cannot be turned into a [`Policy`]
#[derive(Debug, thiserror::Error)]
pub enum PolicyParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("policy document must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
