//! Detection event model
//!
//! An event is a single detection occurrence reported by a device at a
//! monitored location.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Coordinates, Metadata, Timestamp, nullable};

/// Default confidence applied by the store when a create omits it.
pub const DEFAULT_EVENT_CONFIDENCE: f64 = 0.5;

/// Lifecycle status of an event.
///
/// Any status is reachable from any other; see [`crate::store::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    #[default]
    Active,
    Investigating,
    Resolved,
    FalsePositive,
}

impl EventStatus {
    pub const ALL: [EventStatus; 5] = [
        EventStatus::Pending,
        EventStatus::Active,
        EventStatus::Investigating,
        EventStatus::Resolved,
        EventStatus::FalsePositive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Active => "active",
            EventStatus::Investigating => "investigating",
            EventStatus::Resolved => "resolved",
            EventStatus::FalsePositive => "false_positive",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "invalid event status '{}'; expected one of pending, active, investigating, resolved, false_positive",
                    value
                )
            })
    }
}

/// A stored detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    #[schema(example = "0b8f3c1e-5f4e-4c1b-9d7a-2f1e0c9b8a7d")]
    pub id: String,
    #[schema(example = "EDGE-LOCATION-001")]
    pub location_id: String,
    /// Location name captured when the event was created; not refreshed on rename.
    #[schema(example = "Riverside lot")]
    pub location_name: String,
    #[schema(example = "illegal_dumping")]
    pub event_type: String,
    pub coordinates: Option<Coordinates>,
    #[schema(example = 0.92, minimum = 0.0, maximum = 1.0)]
    pub confidence_score: f64,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub status: EventStatus,
    #[schema(example = "2024-01-15T10:30:00.000Z")]
    #[schema(value_type = String)]
    pub detected_at: Timestamp,
    /// First time the event reached `resolved`; never cleared afterwards.
    #[schema(value_type = Option<String>)]
    pub resolved_at: Option<Timestamp>,
    pub metadata: Metadata,
    #[schema(value_type = String)]
    pub created_at: Timestamp,
    #[schema(value_type = String)]
    pub updated_at: Timestamp,
}

/// Fields for creating an event. Id and timestamps are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub location_id: String,
    pub location_name: String,
    pub event_type: String,
    pub coordinates: Option<Coordinates>,
    /// Defaults to [`DEFAULT_EVENT_CONFIDENCE`].
    pub confidence_score: Option<f64>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    /// Defaults to [`EventStatus::Active`].
    pub status: Option<EventStatus>,
    pub metadata: Metadata,
}

/// Partial update for an event. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct EventPatch {
    pub status: Option<EventStatus>,
    #[schema(minimum = 0.0, maximum = 1.0)]
    pub confidence_score: Option<f64>,
    /// `null` clears the stored coordinates.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Coordinates>, nullable)]
    pub coordinates: Option<Option<Coordinates>>,
    /// `null` clears the stored image reference.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub image_url: Option<Option<String>>,
    /// `null` clears the stored video reference.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub video_url: Option<Option<String>>,
    /// Explicit resolution time (RFC 3339); overrides the automatic stamp.
    /// Rejected unless the patch resolves the event or it was resolved before.
    #[schema(value_type = Option<String>)]
    pub resolved_at: Option<Timestamp>,
    /// Merged key-wise into the stored metadata.
    pub metadata: Option<Metadata>,
}

/// Query for [`crate::store::EntityStore::list_events`].
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub location_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            status: None,
            location_id: None,
            limit: 50,
            offset: 0,
        }
    }
}
