//! Operator-facing alert model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Metadata, Timestamp};

/// Alert type raised for every ingested detection report.
pub const WASTE_DETECTED_ALERT: &str = "waste_detected";

/// Recorded as `acknowledged_by` when neither an actor nor a device id is known.
pub const DEFAULT_ACKNOWLEDGER: &str = "dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Sent,
    Failed,
    Acknowledged,
    #[default]
    Active,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 5] = [
        AlertStatus::Pending,
        AlertStatus::Sent,
        AlertStatus::Failed,
        AlertStatus::Acknowledged,
        AlertStatus::Active,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Sent => "sent",
            AlertStatus::Failed => "failed",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Active => "active",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AlertStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "invalid alert status '{}'; expected one of pending, sent, failed, acknowledged, active",
                    value
                )
            })
    }
}

/// A stored alert, optionally tied to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    pub id: String,
    pub event_id: Option<String>,
    #[schema(example = "waste_detected")]
    pub alert_type: String,
    pub message: String,
    pub status: AlertStatus,
    /// Nominal alert time used for ordering.
    #[schema(example = "2024-01-15T10:30:00.000Z")]
    #[schema(value_type = String)]
    pub sent_at: Timestamp,
    pub metadata: Metadata,
    #[schema(value_type = String)]
    pub created_at: Timestamp,
    #[schema(value_type = String)]
    pub updated_at: Timestamp,
}

/// Fields for creating an alert.
#[derive(Debug, Clone, Default)]
pub struct NewAlert {
    /// Must reference an existing event when present.
    pub event_id: Option<String>,
    pub alert_type: String,
    pub message: String,
    /// Defaults to [`AlertStatus::Active`].
    pub status: Option<AlertStatus>,
    pub metadata: Metadata,
}

/// Partial update for an alert.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AlertPatch {
    pub status: Option<AlertStatus>,
    pub message: Option<String>,
    /// Merged key-wise into the stored metadata.
    pub metadata: Option<Metadata>,
    /// Operator recorded when the alert is acknowledged.
    pub acknowledged_by: Option<String>,
}

/// Who is acting on an alert, used to fill `metadata.acknowledged_by`.
#[derive(Debug, Clone, Default)]
pub struct AckActor {
    pub actor: Option<String>,
    pub device_id: Option<String>,
}

impl AckActor {
    /// Explicit actor, then device id, then [`DEFAULT_ACKNOWLEDGER`].
    pub fn resolve(&self) -> String {
        [self.actor.as_deref(), self.device_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or(DEFAULT_ACKNOWLEDGER)
            .to_string()
    }
}

/// Query for [`crate::store::EntityStore::list_alerts`].
#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    /// Matches alerts whose event belongs to this location.
    pub location_id: Option<String>,
    pub limit: usize,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            status: None,
            location_id: None,
            limit: 50,
        }
    }
}
