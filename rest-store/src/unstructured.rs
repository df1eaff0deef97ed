//! Generic attribute-map view of stored objects.
//!
//! Watch, list and deletion machinery works on [`Unstructured`] so it never
//! needs to know the concrete type; [`to_generic`] and [`from_generic`] move
//! between the two representations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unstructured(Map<String, Value>);

impl Unstructured {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidInput(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.metadata()
            .and_then(|meta| meta.get(field))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Sets a string metadata field; an empty value removes it.
    pub fn set_metadata_str(&mut self, field: &str, value: &str) {
        let entry = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(meta) = entry {
            if value.is_empty() {
                meta.remove(field);
            } else {
                meta.insert(field.to_string(), Value::String(value.to_string()));
            }
        }
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    pub fn set_name(&mut self, name: &str) {
        self.set_metadata_str("name", name);
    }

    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.set_metadata_str("namespace", namespace);
    }

    pub fn resource_version(&self) -> &str {
        self.metadata_str("resourceVersion")
    }

    pub fn set_resource_version(&mut self, resource_version: &str) {
        self.set_metadata_str("resourceVersion", resource_version);
    }

    pub fn uid(&self) -> &str {
        self.metadata_str("uid")
    }

    pub fn finalizers(&self) -> Vec<String> {
        self.metadata()
            .and_then(|meta| meta.get("finalizers"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn deletion_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        match self.metadata_str("deletionTimestamp") {
            "" => Ok(None),
            raw => DateTime::parse_from_rfc3339(raw)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| {
                    StoreError::InvalidInput(format!("invalid deletionTimestamp {raw:?}: {e}"))
                }),
        }
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata()
            .and_then(|meta| meta.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_list(&self) -> bool {
        self.0.get("items").is_some_and(Value::is_array)
    }

    /// Removes and returns the `items` array of a list object.
    pub fn take_items(&mut self) -> Vec<Value> {
        match self.0.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// Clears the namespace of the object, and of every item if it is a list.
    pub fn strip_namespace(&mut self) {
        if let Some(Value::Array(items)) = self.0.get_mut("items") {
            for item in items.iter_mut() {
                if let Some(meta) = item.get_mut("metadata").and_then(Value::as_object_mut) {
                    meta.remove("namespace");
                }
            }
        }
        if let Some(Value::Object(meta)) = self.0.get_mut("metadata") {
            meta.remove("namespace");
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Converts a typed object into its generic form in one structural walk.
pub fn to_generic<T: Serialize>(object: &T) -> Result<Unstructured> {
    Unstructured::from_value(serde_json::to_value(object)?)
}

/// Decodes a generic object into a typed one, starting from `shell`.
///
/// Fields present in `generic` override the shell's; fields it omits keep
/// whatever the shell was pre-populated with.
pub fn from_generic<T>(generic: Unstructured, shell: T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut base = serde_json::to_value(&shell)?;
    merge(&mut base, generic.into_value());
    Ok(serde_json::from_value(base)?)
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (field, value) in overlay {
                match base.get_mut(&field) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(field, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
