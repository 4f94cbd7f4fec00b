//! Monitored location model

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Coordinates, Metadata, Timestamp, nullable};

/// Camera status given to locations created without one.
pub const DEFAULT_CAMERA_STATUS: &str = "active";

/// Well-known metadata key stamped on every heartbeat.
pub const LAST_PING_KEY: &str = "last_ping";

/// Well-known metadata key recording the last reporting device.
pub const LAST_DEVICE_ID_KEY: &str = "last_device_id";

/// A monitored site with a camera and liveness state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    /// Caller-assigned identifier.
    #[schema(example = "EDGE-LOCATION-001")]
    pub id: String,
    #[schema(example = "Riverside lot")]
    pub name: String,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// Conventionally `active`, `inactive` or `maintenance`.
    #[schema(example = "active")]
    pub camera_status: String,
    pub settings: Metadata,
    /// Carries `last_ping` and `last_device_id`.
    pub metadata: Metadata,
    #[schema(value_type = String)]
    pub created_at: Timestamp,
    #[schema(value_type = String)]
    pub updated_at: Timestamp,
}

/// Registration payload for [`crate::store::EntityStore::upsert_location`].
///
/// On an existing location every provided field replaces the stored value;
/// `address` and `coordinates` are cleared only by an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LocationUpsert {
    pub id: String,
    /// Defaults to the id when creating.
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Coordinates>, nullable)]
    pub coordinates: Option<Option<Coordinates>>,
    pub camera_status: Option<String>,
    pub settings: Option<Metadata>,
    pub metadata: Option<Metadata>,
}

/// Heartbeat payload for [`crate::store::EntityStore::record_location_ping`].
#[derive(Debug, Clone, Default)]
pub struct LocationPing {
    pub camera_status: Option<String>,
    /// Replaces stored settings when present.
    pub settings: Option<Metadata>,
    /// Merged key-wise into stored metadata.
    pub metadata: Option<Metadata>,
}
