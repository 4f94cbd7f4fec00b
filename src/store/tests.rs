//! # Tests for the Entity Store

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use super::*;
use crate::bus::{Subscription, Topic};
use crate::clock::ManualClock;
use crate::models::{Coordinates, Metadata};

fn setup() -> (EntityStore, Arc<ManualClock>, Subscription) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
    ));
    let bus = EventBus::new();
    let subscription = bus.subscribe(&Topic::ALL);
    let store = EntityStore::new(bus, clock.clone());
    (store, clock, subscription)
}

fn drain(subscription: &mut Subscription) -> Vec<Notification> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}

fn new_event(location_id: &str) -> NewEvent {
    NewEvent {
        location_id: location_id.to_string(),
        location_name: format!("{} name", location_id),
        event_type: "illegal_dumping".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_event_applies_defaults() {
    let (store, _clock, mut sub) = setup();

    let event = store.create_event(new_event("loc-1")).await.unwrap();

    assert_eq!(event.status, EventStatus::Active);
    assert_eq!(event.confidence_score, DEFAULT_EVENT_CONFIDENCE);
    assert_eq!(event.resolved_at, None);
    assert_eq!(event.detected_at, "2024-01-15T10:30:00.000Z");
    assert_eq!(event.detected_at, event.created_at);
    assert_eq!(event.created_at, event.updated_at);

    let notifications = drain(&mut sub);
    assert_eq!(notifications, vec![Notification::EventCreated(event)]);
}

#[tokio::test]
async fn test_create_event_rejects_out_of_range_confidence() {
    let (store, _clock, mut sub) = setup();

    for score in [1.5, -0.01, f64::NAN] {
        let result = store
            .create_event(NewEvent {
                confidence_score: Some(score),
                ..new_event("loc-1")
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::Validation(_))));
    }

    assert!(store.list_events(&EventFilter::default()).await.is_empty());
    assert!(drain(&mut sub).is_empty());
}

#[tokio::test]
async fn test_update_unknown_event_is_not_found_and_silent() {
    let (store, _clock, mut sub) = setup();

    let result = store
        .update_event(
            "missing",
            EventPatch {
                status: Some(EventStatus::Resolved),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    assert!(drain(&mut sub).is_empty());
}

#[tokio::test]
async fn test_update_event_rejects_invalid_confidence_without_publishing() {
    let (store, _clock, mut sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();
    drain(&mut sub);

    let result = store
        .update_event(
            &event.id,
            EventPatch {
                confidence_score: Some(2.0),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(RepositoryError::Validation(_))));
    assert!(drain(&mut sub).is_empty());
    assert_eq!(store.get_event(&event.id).await.unwrap(), event);
}

#[tokio::test]
async fn test_resolving_event_stamps_update_time() {
    let (store, clock, mut sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();

    clock.advance(Duration::minutes(5));
    let resolved = store
        .update_event(
            &event.id,
            EventPatch {
                status: Some(EventStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(resolved.resolved_at.as_deref(), Some("2024-01-15T10:35:00.000Z"));
    assert_eq!(resolved.updated_at, "2024-01-15T10:35:00.000Z");
    assert_eq!(resolved.detected_at, event.detected_at);
    assert!(resolved.detected_at <= resolved.updated_at);

    let topics: Vec<Topic> = drain(&mut sub).iter().map(Notification::topic).collect();
    assert_eq!(topics, vec![Topic::EventCreated, Topic::EventUpdated]);
}

#[tokio::test]
async fn test_explicit_resolved_at_overrides_stamp() {
    let (store, clock, _sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();

    clock.advance(Duration::minutes(5));
    let resolved = store
        .update_event(
            &event.id,
            EventPatch {
                status: Some(EventStatus::Resolved),
                resolved_at: Some("2024-01-15T10:31:00.000Z".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(resolved.resolved_at.as_deref(), Some("2024-01-15T10:31:00.000Z"));
}

#[tokio::test]
async fn test_update_event_rejects_bad_resolved_at_without_publishing() {
    let (store, _clock, mut sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();
    drain(&mut sub);

    let malformed = store
        .update_event(
            &event.id,
            EventPatch {
                status: Some(EventStatus::Resolved),
                resolved_at: Some("not-a-time".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(malformed, Err(RepositoryError::Validation(_))));

    let never_resolved = store
        .update_event(
            &event.id,
            EventPatch {
                resolved_at: Some("2024-01-15T10:31:00.000Z".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(never_resolved, Err(RepositoryError::Validation(_))));

    assert!(drain(&mut sub).is_empty());
    let stored = store.get_event(&event.id).await.unwrap();
    assert_eq!(stored.status, EventStatus::Active);
    assert_eq!(stored.resolved_at, None);
}

#[tokio::test]
async fn test_resolved_at_correction_after_resolution() {
    let (store, clock, _sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();

    clock.advance(Duration::minutes(5));
    store
        .update_event(
            &event.id,
            EventPatch {
                status: Some(EventStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let corrected = store
        .update_event(
            &event.id,
            EventPatch {
                resolved_at: Some("2024-01-15T11:32:00+01:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(corrected.resolved_at.as_deref(), Some("2024-01-15T10:32:00.000Z"));
}

#[tokio::test]
async fn test_reopened_event_keeps_resolved_at() {
    let (store, clock, _sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();

    clock.advance(Duration::minutes(1));
    store
        .update_event(
            &event.id,
            EventPatch {
                status: Some(EventStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    clock.advance(Duration::minutes(1));
    let reopened = store
        .update_event(
            &event.id,
            EventPatch {
                status: Some(EventStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(reopened.status, EventStatus::Active);
    assert_eq!(reopened.resolved_at.as_deref(), Some("2024-01-15T10:31:00.000Z"));
}

#[tokio::test]
async fn test_list_events_orders_filters_then_pages() {
    let (store, clock, _sub) = setup();

    let mut created = Vec::new();
    for location in ["loc-a", "loc-b", "loc-a", "loc-a"] {
        created.push(store.create_event(new_event(location)).await.unwrap());
        clock.advance(Duration::seconds(1));
    }

    let all = store.list_events(&EventFilter::default()).await;
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            created[3].id.as_str(),
            created[2].id.as_str(),
            created[1].id.as_str(),
            created[0].id.as_str()
        ]
    );

    let page = store
        .list_events(&EventFilter {
            location_id: Some("loc-a".to_string()),
            limit: 2,
            offset: 1,
            ..Default::default()
        })
        .await;
    let ids: Vec<&str> = page.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![created[2].id.as_str(), created[0].id.as_str()]);

    let none = store
        .list_events(&EventFilter {
            status: Some(EventStatus::FalsePositive),
            ..Default::default()
        })
        .await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_equal_timestamps_keep_insertion_order() {
    let (store, _clock, _sub) = setup();

    let first = store.create_event(new_event("loc-1")).await.unwrap();
    let second = store.create_event(new_event("loc-1")).await.unwrap();

    let listed = store.list_events(&EventFilter::default()).await;
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);
}

#[tokio::test]
async fn test_query_results_are_independent_copies() {
    let (store, _clock, _sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();

    let mut listed = store.list_events(&EventFilter::default()).await;
    listed[0].status = EventStatus::FalsePositive;
    listed[0].metadata.insert("tampered", true);

    let mut fetched = store.get_event(&event.id).await.unwrap();
    fetched.confidence_score = 0.0;
    assert_ne!(fetched, event);

    let summary = store.summary().await;
    assert_eq!(summary.events, vec![event.clone()]);
    assert_eq!(store.get_event(&event.id).await.unwrap(), event);
}

#[tokio::test]
async fn test_create_alert_requires_existing_event() {
    let (store, _clock, mut sub) = setup();

    let result = store
        .create_alert(NewAlert {
            event_id: Some("ghost".to_string()),
            alert_type: "waste_detected".to_string(),
            message: "x".to_string(),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(RepositoryError::Validation(_))));
    assert!(drain(&mut sub).is_empty());

    let standalone = store
        .create_alert(NewAlert {
            alert_type: "camera_offline".to_string(),
            message: "Camera stopped reporting".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(standalone.status, AlertStatus::Active);
    assert_eq!(standalone.event_id, None);
}

#[tokio::test]
async fn test_list_alerts_by_location_excludes_orphans() {
    let (store, clock, _sub) = setup();

    let evt_a = store.create_event(new_event("loc-a")).await.unwrap();
    let evt_b = store.create_event(new_event("loc-b")).await.unwrap();

    let mut alerts = Vec::new();
    for event_id in [Some(evt_a.id.clone()), Some(evt_b.id.clone()), None, Some(evt_a.id.clone())] {
        clock.advance(Duration::seconds(1));
        alerts.push(
            store
                .create_alert(NewAlert {
                    event_id,
                    alert_type: "waste_detected".to_string(),
                    message: "m".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap(),
        );
    }

    let for_a = store
        .list_alerts(&AlertFilter {
            location_id: Some("loc-a".to_string()),
            ..Default::default()
        })
        .await;
    let ids: Vec<&str> = for_a.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec![alerts[3].id.as_str(), alerts[0].id.as_str()]);

    let for_unknown = store
        .list_alerts(&AlertFilter {
            location_id: Some("nowhere".to_string()),
            ..Default::default()
        })
        .await;
    assert!(for_unknown.is_empty());

    let limited = store
        .list_alerts(&AlertFilter {
            limit: 2,
            ..Default::default()
        })
        .await;
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, alerts[3].id);

    let by_event = store.get_alerts_by_event_id(&evt_a.id).await;
    assert_eq!(by_event.len(), 2);
    assert!(by_event.iter().all(|a| a.event_id.as_deref() == Some(evt_a.id.as_str())));
}

#[tokio::test]
async fn test_acknowledge_alert_records_actor() {
    let (store, clock, mut sub) = setup();
    let event = store.create_event(new_event("loc-1")).await.unwrap();
    let alert = store
        .create_alert(NewAlert {
            event_id: Some(event.id.clone()),
            alert_type: "waste_detected".to_string(),
            message: "m".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    drain(&mut sub);

    clock.advance(Duration::seconds(30));
    let acked = store
        .update_alert(
            &alert.id,
            AlertPatch {
                status: Some(AlertStatus::Acknowledged),
                ..Default::default()
            },
            Some("edge-raspi-01".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(
        acked.metadata.get_str(lifecycle::ACKNOWLEDGED_AT_KEY),
        Some("2024-01-15T10:30:30.000Z")
    );
    assert_eq!(
        acked.metadata.get_str(lifecycle::ACKNOWLEDGED_BY_KEY),
        Some("edge-raspi-01")
    );
    assert_eq!(drain(&mut sub), vec![Notification::AlertUpdated(acked)]);
}

#[tokio::test]
async fn test_update_unknown_alert_is_not_found() {
    let (store, _clock, mut sub) = setup();
    let result = store
        .update_alert("missing", AlertPatch::default(), None)
        .await;
    assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    assert!(drain(&mut sub).is_empty());
}

#[tokio::test]
async fn test_upsert_location_creates_then_merges() {
    let (store, clock, mut sub) = setup();

    let created = store
        .upsert_location(LocationUpsert {
            id: "loc-1".to_string(),
            address: Some(Some("1 River Rd".to_string())),
            coordinates: Some(Some(Coordinates { lat: 1.0, lng: 2.0 })),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.name, "loc-1");
    assert_eq!(created.camera_status, DEFAULT_CAMERA_STATUS);

    clock.advance(Duration::seconds(1));
    let renamed = store
        .upsert_location(LocationUpsert {
            id: "loc-1".to_string(),
            name: Some("Riverside".to_string()),
            coordinates: Some(None),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(renamed.name, "Riverside");
    assert_eq!(renamed.address.as_deref(), Some("1 River Rd"));
    assert_eq!(renamed.coordinates, None);
    assert_eq!(renamed.created_at, created.created_at);
    assert_eq!(renamed.updated_at, "2024-01-15T10:30:01.000Z");

    let topics: Vec<Topic> = drain(&mut sub).iter().map(Notification::topic).collect();
    assert_eq!(topics, vec![Topic::LocationCreated, Topic::LocationUpdated]);
    assert_eq!(store.list_locations().await.len(), 1);
}

#[tokio::test]
async fn test_upsert_location_rejects_blank_id() {
    let (store, _clock, mut sub) = setup();
    let result = store
        .upsert_location(LocationUpsert {
            id: "  ".to_string(),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(RepositoryError::Validation(_))));
    assert!(drain(&mut sub).is_empty());
}

#[tokio::test]
async fn test_event_location_name_is_a_snapshot() {
    let (store, _clock, _sub) = setup();
    store
        .upsert_location(LocationUpsert {
            id: "loc-1".to_string(),
            name: Some("Old name".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let event = store
        .create_event(NewEvent {
            location_name: "Old name".to_string(),
            ..new_event("loc-1")
        })
        .await
        .unwrap();

    store
        .upsert_location(LocationUpsert {
            id: "loc-1".to_string(),
            name: Some("New name".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(
        store.get_event(&event.id).await.unwrap().location_name,
        "Old name"
    );
}

#[tokio::test]
async fn test_ping_unknown_location_creates_placeholder() {
    let (store, _clock, mut sub) = setup();

    let location = store
        .record_location_ping("cam-7", LocationPing::default())
        .await
        .unwrap();

    assert_eq!(location.name, "cam-7");
    assert_eq!(location.camera_status, "active");
    assert_eq!(
        location.metadata.get_str(LAST_PING_KEY),
        Some("2024-01-15T10:30:00.000Z")
    );
    assert_eq!(drain(&mut sub), vec![Notification::LocationUpdated(location)]);

    let overridden = store
        .record_location_ping(
            "cam-8",
            LocationPing {
                camera_status: Some("maintenance".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(overridden.camera_status, "maintenance");
}

#[tokio::test]
async fn test_ping_merges_metadata_keywise() {
    let (store, clock, _sub) = setup();
    store
        .record_location_ping(
            "cam-1",
            LocationPing {
                metadata: Metadata::from_value(json!({"firmware": "1.0", "temp_c": 41})),
                settings: Metadata::from_value(json!({"fps": 10})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    clock.advance(Duration::minutes(1));
    let pinged = store
        .record_location_ping(
            "cam-1",
            LocationPing {
                camera_status: Some("inactive".to_string()),
                metadata: Metadata::from_value(json!({"temp_c": 44, "last_device_id": "edge-2"})),
                settings: Metadata::from_value(json!({"resolution": "720p"})),
            },
        )
        .await
        .unwrap();

    assert_eq!(pinged.camera_status, "inactive");
    assert_eq!(pinged.settings.into_value(), json!({"resolution": "720p"}));
    assert_eq!(
        pinged.metadata.into_value(),
        json!({
            "firmware": "1.0",
            "temp_c": 44,
            "last_device_id": "edge-2",
            "last_ping": "2024-01-15T10:31:00.000Z"
        })
    );
}

#[tokio::test]
async fn test_ping_always_overwrites_last_ping() {
    let (store, _clock, _sub) = setup();
    let location = store
        .record_location_ping(
            "cam-1",
            LocationPing {
                metadata: Metadata::from_value(json!({"last_ping": "1999-01-01T00:00:00.000Z"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        location.metadata.get_str(LAST_PING_KEY),
        Some("2024-01-15T10:30:00.000Z")
    );
}

#[tokio::test]
async fn test_list_locations_sorted_by_name() {
    let (store, _clock, _sub) = setup();
    for (id, name) in [("3", "charlie"), ("1", "Bravo"), ("2", "alpha")] {
        store
            .upsert_location(LocationUpsert {
                id: id.to_string(),
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let names: Vec<String> = store
        .list_locations()
        .await
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(names, vec!["alpha", "Bravo", "charlie"]);
}

#[tokio::test]
async fn test_summary_contains_all_collections() {
    let (store, _clock, _sub) = setup();
    store
        .record_location_ping("loc-1", LocationPing::default())
        .await
        .unwrap();
    let event = store.create_event(new_event("loc-1")).await.unwrap();
    store
        .create_alert(NewAlert {
            event_id: Some(event.id.clone()),
            alert_type: "waste_detected".to_string(),
            message: "m".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let summary = store.summary().await;
    assert_eq!(summary.locations.len(), 1);
    assert_eq!(summary.events.len(), 1);
    assert_eq!(summary.alerts.len(), 1);
    assert_eq!(summary.alerts[0].event_id.as_deref(), Some(event.id.as_str()));
}
