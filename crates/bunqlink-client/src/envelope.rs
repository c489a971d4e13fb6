//! bunq response envelope
//!
//! Success bodies look like `{"Response": [{"Token": {...}}, {"Id": {...}}]}`:
//! an ordered array of single-key objects whose key names the item type.
//! Failures look like `{"Error": [{"error_description": "...", ...}]}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BunqError, BunqResult, ErrorItem};

/// One tagged element of a `Response` array
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseItem {
    pub type_name: String,
    pub value: Value,
}

/// Pagination links attached to list responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub future_url: Option<String>,
    #[serde(default)]
    pub newer_url: Option<String>,
    #[serde(default)]
    pub older_url: Option<String>,
}

/// Parsed success envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    pub items: Vec<ResponseItem>,
    pub pagination: Option<Pagination>,
}

impl ResponseEnvelope {
    /// Parse a success body
    ///
    /// A body without a `Response` array yields an empty envelope; callers
    /// decide whether the items they need are present.
    pub fn from_value(body: &Value) -> BunqResult<Self> {
        let items = match body.get("Response") {
            Some(Value::Array(entries)) => entries.iter().filter_map(Self::tagged).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(BunqError::Transport(format!(
                    "Unexpected Response shape: expected array, got {}",
                    json_kind(other)
                )))
            }
        };

        let pagination = match body.get("Pagination") {
            Some(value) if !value.is_null() => Some(serde_json::from_value(value.clone())?),
            _ => None,
        };

        Ok(Self { items, pagination })
    }

    fn tagged(entry: &Value) -> Option<ResponseItem> {
        let object = entry.as_object()?;
        let (type_name, value) = object.iter().next()?;
        Some(ResponseItem {
            type_name: type_name.clone(),
            value: value.clone(),
        })
    }

    /// First item of the given type
    pub fn find(&self, type_name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.type_name == type_name)
            .map(|item| &item.value)
    }

    /// First item of the given type, decoded
    pub fn find_as<T: DeserializeOwned>(&self, type_name: &str) -> Option<T> {
        self.find(type_name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Every item of the given type, in order
    pub fn all(&self, type_name: &str) -> impl Iterator<Item = &Value> + '_ {
        let type_name = type_name.to_string();
        self.items
            .iter()
            .filter(move |item| item.type_name == type_name)
            .map(|item| &item.value)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Extract the `Error` array if the body carries one
pub fn error_items(body: &Value) -> Option<Vec<ErrorItem>> {
    let errors = body.get("Error")?;
    let items = errors
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    Some(items)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
