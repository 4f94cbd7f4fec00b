//! # Data Models
//!
//! This module contains the domain records owned by the entity store
//! (events, alerts, locations), the shared value types they are built from,
//! and the patch/filter types accepted by store operations.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

pub mod alert;
pub mod event;
pub mod location;

pub use alert::{
    AckActor, Alert, AlertFilter, AlertPatch, AlertStatus, DEFAULT_ACKNOWLEDGER, NewAlert,
    WASTE_DETECTED_ALERT,
};
pub use event::{DEFAULT_EVENT_CONFIDENCE, Event, EventFilter, EventPatch, EventStatus, NewEvent};
pub use location::{
    DEFAULT_CAMERA_STATUS, LAST_DEVICE_ID_KEY, LAST_PING_KEY, Location, LocationPing,
    LocationUpsert,
};

/// ISO-8601 timestamp string (UTC, millisecond precision, `Z` suffix).
///
/// Kept as a string: chronological ordering is string ordering.
pub type Timestamp = String;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "dumpwatch".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    #[schema(example = 35.6812)]
    pub lat: f64,
    #[schema(example = 139.7671)]
    pub lng: f64,
}

impl Coordinates {
    /// Parse a loosely-typed JSON value, requiring both `lat` and `lng` to be numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let lat = object.get("lat")?.as_f64()?;
        let lng = object.get("lng")?.as_f64()?;
        Some(Self { lat, lng })
    }
}

/// Open key-value bag attached to events, alerts and locations.
///
/// Keys are kept in sorted order. Two merge strategies exist and each store
/// operation documents which one it applies:
/// - replacement: the incoming bag takes the place of the stored one;
/// - key-wise union ([`Metadata::merge`]): stored keys survive unless the
///   incoming bag carries the same key, in which case the incoming value wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(value_type = Object)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; only objects are accepted.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Key-wise union; keys present in `incoming` overwrite stored ones.
    pub fn merge(&mut self, incoming: Metadata) {
        for (key, value) in incoming.0 {
            self.0.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Deserialize a field that distinguishes "absent" from explicit `null`.
///
/// Used with `#[serde(default, deserialize_with = "nullable")]` on
/// `Option<Option<T>>` fields: absent → `None`, `null` → `Some(None)`,
/// value → `Some(Some(v))`.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
