//! Status state machines for events and alerts.
//!
//! Transitions are permissive: any status may move to any other. The only
//! coupled side effects are the resolution stamp on events and the
//! acknowledgement stamps on alerts.

use chrono::{DateTime, Utc};

use crate::clock::format_timestamp;
use crate::error::RepositoryError;
use crate::models::{AckActor, Alert, AlertPatch, AlertStatus, Event, EventPatch, EventStatus, Timestamp};

/// Metadata key stamped when an alert is acknowledged.
pub const ACKNOWLEDGED_AT_KEY: &str = "acknowledged_at";

/// Metadata key naming who acknowledged an alert.
pub const ACKNOWLEDGED_BY_KEY: &str = "acknowledged_by";

/// Reject confidence scores outside `[0, 1]`, NaN included.
pub fn validate_confidence(score: f64) -> Result<(), RepositoryError> {
    if (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(RepositoryError::validation(format!(
            "confidence_score must be within [0, 1], got {}",
            score
        )))
    }
}

/// Check field values and normalize an explicit `resolved_at` to the store's
/// timestamp format.
pub fn validate_event_patch(patch: &mut EventPatch) -> Result<(), RepositoryError> {
    if let Some(score) = patch.confidence_score {
        validate_confidence(score)?;
    }
    if let Some(raw) = patch.resolved_at.take() {
        let parsed = DateTime::parse_from_rfc3339(raw.trim()).map_err(|err| {
            RepositoryError::validation(format!(
                "resolved_at must be an RFC 3339 timestamp, got '{}': {}",
                raw, err
            ))
        })?;
        patch.resolved_at = Some(format_timestamp(parsed.with_timezone(&Utc)));
    }
    Ok(())
}

/// An explicit `resolved_at` is only accepted when the patch resolves the
/// event or the event has been resolved before.
pub fn check_resolution(event: &Event, patch: &EventPatch) -> Result<(), RepositoryError> {
    let resolving = patch.status == Some(EventStatus::Resolved);
    if patch.resolved_at.is_some() && !resolving && event.resolved_at.is_none() {
        return Err(RepositoryError::validation(format!(
            "resolved_at cannot be set on event '{}' which has never been resolved",
            event.id
        )));
    }
    Ok(())
}

/// Merge `patch` into `event` and stamp `updated_at`.
///
/// Setting the status to `resolved` stamps `resolved_at = now` unless the
/// patch carries its own `resolved_at`. Nothing ever clears `resolved_at`.
pub fn apply_event_patch(event: &mut Event, patch: EventPatch, now: &Timestamp) {
    if let Some(status) = patch.status {
        event.status = status;
    }
    if let Some(score) = patch.confidence_score {
        event.confidence_score = score;
    }
    if let Some(coordinates) = patch.coordinates {
        event.coordinates = coordinates;
    }
    if let Some(image_url) = patch.image_url {
        event.image_url = image_url;
    }
    if let Some(video_url) = patch.video_url {
        event.video_url = video_url;
    }
    if let Some(metadata) = patch.metadata {
        event.metadata.merge(metadata);
    }

    match patch.resolved_at {
        Some(explicit) => event.resolved_at = Some(explicit),
        None if patch.status == Some(EventStatus::Resolved) => {
            event.resolved_at = Some(now.clone())
        }
        None => {}
    }

    event.updated_at = now.clone();
}

/// Merge `patch` into `alert` and stamp `updated_at`.
///
/// Setting the status to `acknowledged` records `acknowledged_at` and
/// `acknowledged_by` in the metadata, after any caller-supplied metadata.
pub fn apply_alert_patch(alert: &mut Alert, patch: AlertPatch, device_id: Option<String>, now: &Timestamp) {
    let actor = AckActor {
        actor: patch.acknowledged_by,
        device_id,
    };

    if let Some(status) = patch.status {
        alert.status = status;
    }
    if let Some(message) = patch.message {
        alert.message = message;
    }
    if let Some(metadata) = patch.metadata {
        alert.metadata.merge(metadata);
    }

    if patch.status == Some(AlertStatus::Acknowledged) {
        alert.metadata.insert(ACKNOWLEDGED_AT_KEY, now.clone());
        alert.metadata.insert(ACKNOWLEDGED_BY_KEY, actor.resolve());
    }

    alert.updated_at = now.clone();
}
