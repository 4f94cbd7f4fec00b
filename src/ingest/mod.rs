//! # Device Ingestion
//!
//! Boundary validation for detection reports and heartbeats sent by field
//! devices, and the report flow that turns one detection into a location
//! touch, an event and its companion alert.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;

use crate::error::RepositoryError;
use crate::models::{
    Alert, Coordinates, Event, EventStatus, LAST_DEVICE_ID_KEY, Location, LocationPing,
    LocationUpsert, Metadata, NewAlert, NewEvent, WASTE_DETECTED_ALERT,
};
use crate::store::EntityStore;

/// Header devices use to identify themselves.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Metadata key a device may use instead of the header.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Provenance recorded in `settings.registered_via` for report-created locations.
pub const REGISTERED_VIA_EVENT_REPORT: &str = "event_report";

/// Detection report posted by an edge device.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DetectionReport {
    #[schema(example = "EDGE-LOCATION-001")]
    pub location_id: Option<String>,
    #[schema(example = "illegal_dumping")]
    pub event_type: Option<String>,
    /// `{lat, lng}`, both numeric.
    #[schema(value_type = Option<Coordinates>)]
    pub coordinates: Option<Value>,
    /// Defaults to the configured report confidence.
    #[schema(minimum = 0.0, maximum = 1.0, example = 0.9)]
    pub confidence_score: Option<f64>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Liveness ping posted by an edge device.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct HeartbeatReport {
    #[serde(alias = "location_id")]
    #[schema(example = "EDGE-LOCATION-001")]
    pub id: Option<String>,
    #[schema(example = "active")]
    pub camera_status: Option<String>,
    pub settings: Option<Metadata>,
    pub metadata: Option<Metadata>,
}

/// Entities produced by one accepted detection report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestOutcome {
    pub location: Location,
    pub event: Event,
    pub alert: Alert,
}

struct ValidatedReport {
    location_id: String,
    event_type: String,
    coordinates: Option<Coordinates>,
    confidence_score: f64,
    image_url: Option<String>,
    video_url: Option<String>,
    metadata: Metadata,
}

fn required(field: &str, value: Option<String>) -> Result<String, RepositoryError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RepositoryError::validation(format!("{} is required", field)))
}

impl DetectionReport {
    fn validate(self, default_confidence: f64) -> Result<ValidatedReport, RepositoryError> {
        let location_id = required("location_id", self.location_id)?;
        let event_type = required("event_type", self.event_type)?;

        let coordinates = match self.coordinates {
            None | Some(Value::Null) => None,
            Some(raw) => Some(Coordinates::from_value(&raw).ok_or_else(|| {
                RepositoryError::validation("coordinates must contain numeric lat and lng")
            })?),
        };

        let confidence_score = self.confidence_score.unwrap_or(default_confidence);
        crate::store::lifecycle::validate_confidence(confidence_score)?;

        Ok(ValidatedReport {
            location_id,
            event_type,
            coordinates,
            confidence_score,
            image_url: self.image_url,
            video_url: self.video_url,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

/// Header value first, then `metadata.device_id`. Blank values count as absent.
pub fn resolve_device_id(header: Option<&str>, metadata: Option<&Metadata>) -> Option<String> {
    let non_blank = |value: &str| {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    };
    header
        .and_then(non_blank)
        .or_else(|| metadata.and_then(|m| m.get_str(DEVICE_ID_KEY)).and_then(non_blank))
}

fn device_metadata(device_id: Option<&str>) -> Metadata {
    match device_id {
        Some(id) => Metadata::new().with(LAST_DEVICE_ID_KEY, id),
        None => Metadata::new(),
    }
}

fn alert_message(event_type: &str, location_name: &str, confidence_score: f64) -> String {
    format!(
        "{} detected at {} (confidence {:.0}%)",
        event_type.replace('_', " "),
        location_name,
        confidence_score * 100.0
    )
}

/// Accept a detection report.
///
/// Unknown locations are registered under their own id; known ones get a
/// liveness ping. Then the event and its `waste_detected` alert are created,
/// so subscribers see the location change before the event and the alert.
pub async fn ingest_report(
    store: &EntityStore,
    report: DetectionReport,
    header_device_id: Option<&str>,
    default_confidence: f64,
) -> Result<IngestOutcome, RepositoryError> {
    let device_id = resolve_device_id(header_device_id, report.metadata.as_ref());
    let report = report.validate(default_confidence)?;

    let (location, _created) = store
        .register_or_ping_location(
            LocationUpsert {
                id: report.location_id.clone(),
                settings: Some(Metadata::new().with("registered_via", REGISTERED_VIA_EVENT_REPORT)),
                metadata: Some(device_metadata(device_id.as_deref())),
                ..Default::default()
            },
            LocationPing {
                metadata: Some(device_metadata(device_id.as_deref())),
                ..Default::default()
            },
        )
        .await?;

    let mut event_metadata = report.metadata;
    if let Some(id) = device_id.as_deref()
        && !event_metadata.contains_key(DEVICE_ID_KEY)
    {
        event_metadata.insert(DEVICE_ID_KEY, id);
    }

    let event = store
        .create_event(NewEvent {
            location_id: location.id.clone(),
            location_name: location.name.clone(),
            event_type: report.event_type,
            coordinates: report.coordinates,
            confidence_score: Some(report.confidence_score),
            image_url: report.image_url,
            video_url: report.video_url,
            status: Some(EventStatus::Active),
            metadata: event_metadata,
        })
        .await?;

    let alert = store
        .create_alert(NewAlert {
            event_id: Some(event.id.clone()),
            alert_type: WASTE_DETECTED_ALERT.to_string(),
            message: alert_message(&event.event_type, &location.name, event.confidence_score),
            status: None,
            metadata: Metadata::new()
                .with("location_id", location.id.clone())
                .with("event_type", event.event_type.clone())
                .with("confidence_score", event.confidence_score),
        })
        .await?;

    info!(
        location_id = %location.id,
        event_id = %event.id,
        alert_id = %alert.id,
        device_id = device_id.as_deref().unwrap_or("-"),
        "Detection report ingested"
    );

    Ok(IngestOutcome {
        location,
        event,
        alert,
    })
}

/// Accept a heartbeat and forward it to the location ping.
pub async fn record_heartbeat(
    store: &EntityStore,
    report: HeartbeatReport,
    header_device_id: Option<&str>,
) -> Result<Location, RepositoryError> {
    let device_id = resolve_device_id(header_device_id, report.metadata.as_ref());
    let id = required("id", report.id)?;

    let mut metadata = report.metadata.unwrap_or_default();
    metadata.merge(device_metadata(device_id.as_deref()));

    store
        .record_location_ping(
            &id,
            LocationPing {
                camera_status: report.camera_status,
                settings: report.settings,
                metadata: (!metadata.is_empty()).then_some(metadata),
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, Notification, Topic};
    use crate::models::{AlertStatus, LAST_PING_KEY};
    use serde_json::json;

    fn report(value: Value) -> DetectionReport {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_report_for_unknown_location() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&Topic::ALL);
        let store = EntityStore::with_system_clock(bus);

        let outcome = ingest_report(
            &store,
            report(json!({
                "location_id": "loc-1",
                "event_type": "illegal_dumping",
                "confidence_score": 0.9,
                "metadata": {"device_id": "edge-raspi-01"}
            })),
            None,
            0.8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.location.id, "loc-1");
        assert_eq!(outcome.location.name, "loc-1");
        assert_eq!(outcome.location.camera_status, "active");
        assert_eq!(
            outcome.location.settings.get_str("registered_via"),
            Some(REGISTERED_VIA_EVENT_REPORT)
        );
        assert_eq!(
            outcome.location.metadata.get_str(LAST_DEVICE_ID_KEY),
            Some("edge-raspi-01")
        );
        assert_eq!(outcome.event.status, EventStatus::Active);
        assert_eq!(outcome.event.confidence_score, 0.9);
        assert_eq!(outcome.alert.alert_type, WASTE_DETECTED_ALERT);
        assert_eq!(outcome.alert.status, AlertStatus::Active);
        assert_eq!(outcome.alert.event_id.as_deref(), Some(outcome.event.id.as_str()));
        assert_eq!(outcome.alert.message, "illegal dumping detected at loc-1 (confidence 90%)");

        let topics: Vec<Topic> = std::iter::from_fn(|| sub.try_recv())
            .map(|n| n.topic())
            .collect();
        assert_eq!(
            topics,
            vec![Topic::LocationCreated, Topic::EventCreated, Topic::AlertCreated]
        );
    }

    #[tokio::test]
    async fn test_report_for_known_location_pings_it() {
        let store = EntityStore::with_system_clock(EventBus::new());
        store
            .upsert_location(LocationUpsert {
                id: "loc-1".into(),
                name: Some("Riverside".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let mut sub = store.bus().subscribe(&Topic::ALL);

        let outcome = ingest_report(
            &store,
            report(json!({"location_id": "loc-1", "event_type": "illegal_dumping"})),
            Some("edge-7"),
            0.8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.event.location_name, "Riverside");
        assert_eq!(outcome.event.confidence_score, 0.8);
        assert_eq!(outcome.event.metadata.get_str(DEVICE_ID_KEY), Some("edge-7"));
        assert_eq!(outcome.location.metadata.get_str(LAST_DEVICE_ID_KEY), Some("edge-7"));
        assert!(outcome.location.metadata.contains_key(LAST_PING_KEY));

        match sub.try_recv() {
            Some(Notification::LocationUpdated(location)) => assert_eq!(location.id, "loc-1"),
            other => panic!("expected location_updated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_header_keeps_body_device_id() {
        let store = EntityStore::with_system_clock(EventBus::new());

        let outcome = ingest_report(
            &store,
            report(json!({
                "location_id": "loc-1",
                "event_type": "illegal_dumping",
                "metadata": {"device_id": "edge-1"}
            })),
            Some(" "),
            0.8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.location.metadata.get_str(LAST_DEVICE_ID_KEY), Some("edge-1"));
        assert_eq!(outcome.event.metadata.get_str(DEVICE_ID_KEY), Some("edge-1"));
    }

    #[tokio::test]
    async fn test_report_after_heartbeat_keeps_ping_metadata() {
        let store = EntityStore::with_system_clock(EventBus::new());
        record_heartbeat(
            &store,
            serde_json::from_value(json!({
                "id": "loc-1",
                "settings": {"fps": 5},
                "metadata": {"firmware": "2.1"}
            }))
            .unwrap(),
            None,
        )
        .await
        .unwrap();
        let mut sub = store.bus().subscribe(&[Topic::LocationCreated, Topic::LocationUpdated]);

        let outcome = ingest_report(
            &store,
            report(json!({"location_id": "loc-1", "event_type": "illegal_dumping"})),
            Some("edge-4"),
            0.8,
        )
        .await
        .unwrap();

        assert_eq!(outcome.location.metadata.get_str("firmware"), Some("2.1"));
        assert_eq!(outcome.location.metadata.get_str(LAST_DEVICE_ID_KEY), Some("edge-4"));
        assert!(outcome.location.metadata.contains_key(LAST_PING_KEY));
        assert_eq!(outcome.location.settings.get("fps"), Some(&json!(5)));
        assert!(!outcome.location.settings.contains_key("registered_via"));
        assert_eq!(sub.try_recv().map(|n| n.topic()), Some(Topic::LocationUpdated));
    }

    #[tokio::test]
    async fn test_report_validation_failures_create_nothing() {
        let store = EntityStore::with_system_clock(EventBus::new());

        let cases = [
            json!({"event_type": "illegal_dumping"}),
            json!({"location_id": "  ", "event_type": "illegal_dumping"}),
            json!({"location_id": "loc-1"}),
            json!({"location_id": "loc-1", "event_type": "x", "coordinates": {"lat": 1.0}}),
            json!({"location_id": "loc-1", "event_type": "x", "coordinates": {"lat": "1", "lng": 2}}),
            json!({"location_id": "loc-1", "event_type": "x", "confidence_score": 1.2}),
        ];

        for case in cases {
            let result = ingest_report(&store, report(case.clone()), None, 0.8).await;
            assert!(
                matches!(result, Err(RepositoryError::Validation(_))),
                "expected validation failure for {}",
                case
            );
        }

        let summary = store.summary().await;
        assert!(summary.locations.is_empty());
        assert!(summary.events.is_empty());
        assert!(summary.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_records_device_and_ping() {
        let store = EntityStore::with_system_clock(EventBus::new());

        let location = record_heartbeat(
            &store,
            serde_json::from_value(json!({
                "location_id": "cam-1",
                "camera_status": "maintenance",
                "metadata": {"firmware": "2.1"}
            }))
            .unwrap(),
            Some("edge-3"),
        )
        .await
        .unwrap();

        assert_eq!(location.name, "cam-1");
        assert_eq!(location.camera_status, "maintenance");
        assert_eq!(location.metadata.get_str("firmware"), Some("2.1"));
        assert_eq!(location.metadata.get_str(LAST_DEVICE_ID_KEY), Some("edge-3"));
        assert!(location.metadata.contains_key(LAST_PING_KEY));

        let missing = record_heartbeat(&store, HeartbeatReport::default(), None).await;
        assert!(matches!(missing, Err(RepositoryError::Validation(_))));
    }

    #[test]
    fn test_device_id_resolution() {
        let metadata = Metadata::new().with(DEVICE_ID_KEY, "from-body");
        assert_eq!(
            resolve_device_id(Some("from-header"), Some(&metadata)).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            resolve_device_id(Some(" "), Some(&metadata)).as_deref(),
            Some("from-body")
        );
        assert_eq!(resolve_device_id(Some(" "), None), None);
        assert_eq!(resolve_device_id(None, Some(&metadata)).as_deref(), Some("from-body"));
        assert_eq!(resolve_device_id(None, None), None);
    }
}
