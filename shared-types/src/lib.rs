pub mod catalog;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use catalog::{
    Broker, BrokerList, BrokerSpec, ServiceInstance, ServiceInstanceList, ServiceInstanceSpec,
};

/// Metadata carried by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// Opaque to clients; assigned by the backend on every write
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// Metadata carried by list objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

/// A typed object the store can persist.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

/// A typed collection of [`Resource`]s, as returned by list calls.
pub trait ResourceList: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Item: Resource;

    fn items(&self) -> &[Self::Item];
    fn items_mut(&mut self) -> &mut Vec<Self::Item>;
}

/// Kind of change reported by a watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    /// Only ever seen on the wire; the stream ends after it
    Error,
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchEventType::Added => "ADDED",
            WatchEventType::Modified => "MODIFIED",
            WatchEventType::Deleted => "DELETED",
            WatchEventType::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One line of a newline-delimited watch stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: serde_json::Value,
}

/// Error body returned by the REST backend for non-success responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

impl ApiStatus {
    pub fn new(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.reason, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_meta_skips_empty_fields() {
        let meta = ObjectMeta::named("", "b1");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({"name": "b1"}));
    }

    #[test]
    fn test_object_meta_camel_case() {
        let json = serde_json::json!({
            "name": "b1",
            "resourceVersion": "3",
            "deletionTimestamp": "2024-01-01T00:00:00Z",
            "finalizers": ["catalog"]
        });
        let meta: ObjectMeta = serde_json::from_value(json).unwrap();
        assert_eq!(meta.resource_version, "3");
        assert!(meta.deletion_timestamp.is_some());
        assert_eq!(meta.finalizers, vec!["catalog".to_string()]);
    }

    #[test]
    fn test_wire_event_format() {
        let line = r#"{"type":"MODIFIED","object":{"metadata":{"name":"b1"}}}"#;
        let event: WireEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.event_type, WatchEventType::Modified);
        assert_eq!(event.object["metadata"]["name"], "b1");
        assert_eq!(event.event_type.to_string(), "MODIFIED");
    }
}
