//! # Entity Store
//!
//! Exclusive owner of the event, alert and location collections.
//!
//! All read-modify-write sequences run under a single write lock, which is
//! released before the resulting notification is published on the
//! [`EventBus`]. Every value handed out is a clone of the stored record.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::bus::{EventBus, Notification};
use crate::clock::{self, Clock, SystemClock};
use crate::error::RepositoryError;
use crate::models::{
    Alert, AlertFilter, AlertPatch, AlertStatus, DEFAULT_CAMERA_STATUS, DEFAULT_EVENT_CONFIDENCE,
    Event, EventFilter, EventPatch, EventStatus, LAST_PING_KEY, Location, LocationPing,
    LocationUpsert, NewAlert, NewEvent, Timestamp,
};

pub mod lifecycle;

#[cfg(test)]
mod tests;

/// Copies of every collection, for consumers that render a full snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StoreSummary {
    /// Newest first by `detected_at`.
    pub events: Vec<Event>,
    /// Newest first by `sent_at`.
    pub alerts: Vec<Alert>,
    /// Ordered by name.
    pub locations: Vec<Location>,
}

#[derive(Default)]
struct StoreState {
    events: Vec<Event>,
    event_index: HashMap<String, usize>,
    alerts: Vec<Alert>,
    alert_index: HashMap<String, usize>,
    locations: BTreeMap<String, Location>,
}

impl StoreState {
    fn event(&self, id: &str) -> Option<&Event> {
        self.event_index.get(id).and_then(|&idx| self.events.get(idx))
    }

    fn event_mut(&mut self, id: &str) -> Option<&mut Event> {
        let idx = *self.event_index.get(id)?;
        self.events.get_mut(idx)
    }

    fn alert(&self, id: &str) -> Option<&Alert> {
        self.alert_index.get(id).and_then(|&idx| self.alerts.get(idx))
    }

    fn alert_mut(&mut self, id: &str) -> Option<&mut Alert> {
        let idx = *self.alert_index.get(id)?;
        self.alerts.get_mut(idx)
    }

    fn sorted_events(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.events.iter().collect();
        // Stable: equal timestamps keep insertion order.
        events.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        events
    }

    fn sorted_alerts(&self) -> Vec<&Alert> {
        let mut alerts: Vec<&Alert> = self.alerts.iter().collect();
        alerts.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        alerts
    }

    fn sorted_locations(&self) -> Vec<&Location> {
        let mut locations: Vec<&Location> = self.locations.values().collect();
        locations.sort_by(|a, b| compare_location_names(a, b));
        locations
    }
}

/// Case-insensitive name order, then exact name, then id.
fn compare_location_names(a: &Location, b: &Location) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

fn require_non_empty(field: &str, value: &str) -> Result<(), RepositoryError> {
    if value.trim().is_empty() {
        return Err(RepositoryError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn record_mutation(entity: &'static str, op: &'static str) {
    counter!("store_mutations_total", "entity" => entity, "op" => op).increment(1);
}

/// Build a fresh location from upsert fields; unspecified fields take defaults.
fn new_location(fields: LocationUpsert, now: &Timestamp) -> Location {
    Location {
        name: fields.name.unwrap_or_else(|| fields.id.clone()),
        id: fields.id,
        address: fields.address.flatten(),
        coordinates: fields.coordinates.flatten(),
        camera_status: fields
            .camera_status
            .unwrap_or_else(|| DEFAULT_CAMERA_STATUS.to_string()),
        settings: fields.settings.unwrap_or_default(),
        metadata: fields.metadata.unwrap_or_default(),
        created_at: now.clone(),
        updated_at: now.clone(),
    }
}

/// Ping merge: `camera_status`/`settings` replace, `metadata` unions,
/// `last_ping` is stamped.
fn apply_ping(location: &mut Location, ping: LocationPing, now: &Timestamp) {
    if let Some(camera_status) = ping.camera_status {
        location.camera_status = camera_status;
    }
    if let Some(settings) = ping.settings {
        location.settings = settings;
    }
    if let Some(metadata) = ping.metadata {
        location.metadata.merge(metadata);
    }
    location.metadata.insert(LAST_PING_KEY, now.clone());
    location.updated_at = now.clone();
}

/// In-memory store for events, alerts and locations.
pub struct EntityStore {
    state: RwLock<StoreState>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl EntityStore {
    pub fn new(bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            bus,
            clock,
        }
    }

    pub fn with_system_clock(bus: EventBus) -> Self {
        Self::new(bus, Arc::new(SystemClock::new()))
    }

    /// The bus this store publishes to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // --- events ---

    /// Events newest first, filtered before paging.
    pub async fn list_events(&self, filter: &EventFilter) -> Vec<Event> {
        let state = self.state.read().await;
        state
            .sorted_events()
            .into_iter()
            .filter(|event| filter.status.is_none_or(|status| event.status == status))
            .filter(|event| {
                filter
                    .location_id
                    .as_deref()
                    .is_none_or(|location_id| event.location_id == location_id)
            })
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect()
    }

    pub async fn get_event(&self, id: &str) -> Option<Event> {
        self.state.read().await.event(id).cloned()
    }

    pub async fn create_event(&self, fields: NewEvent) -> Result<Event, RepositoryError> {
        require_non_empty("location_id", &fields.location_id)?;
        require_non_empty("event_type", &fields.event_type)?;
        let confidence_score = fields.confidence_score.unwrap_or(DEFAULT_EVENT_CONFIDENCE);
        lifecycle::validate_confidence(confidence_score)?;

        let created = {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp();
            let event = Event {
                id: clock::new_id(),
                location_id: fields.location_id,
                location_name: fields.location_name,
                event_type: fields.event_type,
                coordinates: fields.coordinates,
                confidence_score,
                image_url: fields.image_url,
                video_url: fields.video_url,
                status: fields.status.unwrap_or(EventStatus::Active),
                detected_at: now.clone(),
                resolved_at: None,
                metadata: fields.metadata,
                created_at: now.clone(),
                updated_at: now,
            };
            let idx = state.events.len();
            state.event_index.insert(event.id.clone(), idx);
            state.events.push(event.clone());
            event
        };

        record_mutation("event", "create");
        info!(
            event_id = %created.id,
            location_id = %created.location_id,
            event_type = %created.event_type,
            confidence_score = created.confidence_score,
            "Event created"
        );
        self.bus.publish(Notification::EventCreated(created.clone()));
        Ok(created)
    }

    pub async fn update_event(&self, id: &str, mut patch: EventPatch) -> Result<Event, RepositoryError> {
        lifecycle::validate_event_patch(&mut patch)?;

        let updated = {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp();
            let event = state
                .event_mut(id)
                .ok_or_else(|| RepositoryError::not_found("event", id))?;
            lifecycle::check_resolution(event, &patch)?;
            lifecycle::apply_event_patch(event, patch, &now);
            event.clone()
        };

        record_mutation("event", "update");
        debug!(event_id = %updated.id, status = %updated.status, "Event updated");
        self.bus.publish(Notification::EventUpdated(updated.clone()));
        Ok(updated)
    }

    // --- alerts ---

    /// Alerts newest first by `sent_at`.
    ///
    /// A location filter matches alerts whose event belongs to that location;
    /// alerts without an event never match it.
    pub async fn list_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        let state = self.state.read().await;
        let location_events: Option<HashSet<&str>> = filter.location_id.as_deref().map(|location_id| {
            state
                .events
                .iter()
                .filter(|event| event.location_id == location_id)
                .map(|event| event.id.as_str())
                .collect()
        });

        state
            .sorted_alerts()
            .into_iter()
            .filter(|alert| filter.status.is_none_or(|status| alert.status == status))
            .filter(|alert| match &location_events {
                None => true,
                Some(ids) => alert
                    .event_id
                    .as_deref()
                    .is_some_and(|event_id| ids.contains(event_id)),
            })
            .take(filter.limit)
            .cloned()
            .collect()
    }

    pub async fn get_alert(&self, id: &str) -> Option<Alert> {
        self.state.read().await.alert(id).cloned()
    }

    pub async fn get_alerts_by_event_id(&self, event_id: &str) -> Vec<Alert> {
        self.state
            .read()
            .await
            .alerts
            .iter()
            .filter(|alert| alert.event_id.as_deref() == Some(event_id))
            .cloned()
            .collect()
    }

    pub async fn create_alert(&self, fields: NewAlert) -> Result<Alert, RepositoryError> {
        require_non_empty("alert_type", &fields.alert_type)?;

        let created = {
            let mut state = self.state.write().await;
            if let Some(event_id) = fields.event_id.as_deref()
                && state.event(event_id).is_none()
            {
                return Err(RepositoryError::validation(format!(
                    "event_id '{}' does not reference an existing event",
                    event_id
                )));
            }

            let now = self.clock.timestamp();
            let alert = Alert {
                id: clock::new_id(),
                event_id: fields.event_id,
                alert_type: fields.alert_type,
                message: fields.message,
                status: fields.status.unwrap_or(AlertStatus::Active),
                sent_at: now.clone(),
                metadata: fields.metadata,
                created_at: now.clone(),
                updated_at: now,
            };
            let idx = state.alerts.len();
            state.alert_index.insert(alert.id.clone(), idx);
            state.alerts.push(alert.clone());
            alert
        };

        record_mutation("alert", "create");
        info!(
            alert_id = %created.id,
            event_id = created.event_id.as_deref().unwrap_or("-"),
            alert_type = %created.alert_type,
            "Alert created"
        );
        self.bus.publish(Notification::AlertCreated(created.clone()));
        Ok(created)
    }

    /// Apply `patch` to an alert. `device_id` is the acknowledgement fallback actor.
    pub async fn update_alert(
        &self,
        id: &str,
        patch: AlertPatch,
        device_id: Option<String>,
    ) -> Result<Alert, RepositoryError> {
        let updated = {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp();
            let alert = state
                .alert_mut(id)
                .ok_or_else(|| RepositoryError::not_found("alert", id))?;
            lifecycle::apply_alert_patch(alert, patch, device_id, &now);
            alert.clone()
        };

        record_mutation("alert", "update");
        debug!(alert_id = %updated.id, status = %updated.status, "Alert updated");
        self.bus.publish(Notification::AlertUpdated(updated.clone()));
        Ok(updated)
    }

    // --- locations ---

    pub async fn list_locations(&self) -> Vec<Location> {
        self.state
            .read()
            .await
            .sorted_locations()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_location(&self, id: &str) -> Option<Location> {
        self.state.read().await.locations.get(id).cloned()
    }

    /// Create a location or shallow-merge the provided fields over an existing one.
    pub async fn upsert_location(&self, fields: LocationUpsert) -> Result<Location, RepositoryError> {
        require_non_empty("id", &fields.id)?;
        if let Some(name) = fields.name.as_deref() {
            require_non_empty("name", name)?;
        }

        let (location, created) = {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp();
            match state.locations.get_mut(&fields.id) {
                Some(location) => {
                    if let Some(name) = fields.name {
                        location.name = name;
                    }
                    if let Some(address) = fields.address {
                        location.address = address;
                    }
                    if let Some(coordinates) = fields.coordinates {
                        location.coordinates = coordinates;
                    }
                    if let Some(camera_status) = fields.camera_status {
                        location.camera_status = camera_status;
                    }
                    if let Some(settings) = fields.settings {
                        location.settings = settings;
                    }
                    if let Some(metadata) = fields.metadata {
                        location.metadata = metadata;
                    }
                    location.updated_at = now;
                    (location.clone(), false)
                }
                None => {
                    let location = new_location(fields, &now);
                    state.locations.insert(location.id.clone(), location.clone());
                    (location, true)
                }
            }
        };

        if created {
            record_mutation("location", "create");
            info!(location_id = %location.id, name = %location.name, "Location registered");
            self.bus.publish(Notification::LocationCreated(location.clone()));
        } else {
            record_mutation("location", "update");
            debug!(location_id = %location.id, "Location updated");
            self.bus.publish(Notification::LocationUpdated(location.clone()));
        }
        Ok(location)
    }

    /// Record a liveness signal, creating a placeholder location for unknown ids.
    ///
    /// `camera_status` and `settings` replace, `metadata` is a key-wise union,
    /// and `metadata.last_ping` is always stamped.
    pub async fn record_location_ping(
        &self,
        id: &str,
        ping: LocationPing,
    ) -> Result<Location, RepositoryError> {
        require_non_empty("id", id)?;

        let (location, created) = {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp();
            match state.locations.get_mut(id) {
                Some(location) => {
                    apply_ping(location, ping, &now);
                    (location.clone(), false)
                }
                None => {
                    let mut location = new_location(
                        LocationUpsert {
                            id: id.to_string(),
                            ..Default::default()
                        },
                        &now,
                    );
                    apply_ping(&mut location, ping, &now);
                    state.locations.insert(location.id.clone(), location.clone());
                    (location, true)
                }
            }
        };

        record_mutation("location", if created { "create" } else { "ping" });
        debug!(
            location_id = %location.id,
            camera_status = %location.camera_status,
            created,
            "Location ping recorded"
        );
        self.bus.publish(Notification::LocationUpdated(location.clone()));
        Ok(location)
    }

    /// Register `registration.id` if it is unknown, otherwise apply `ping` to it.
    ///
    /// Both the existence check and the write happen under one write lock, so a
    /// location created concurrently is pinged rather than overwritten. Returns
    /// the stored location and whether it was created.
    pub async fn register_or_ping_location(
        &self,
        registration: LocationUpsert,
        ping: LocationPing,
    ) -> Result<(Location, bool), RepositoryError> {
        require_non_empty("id", &registration.id)?;

        let (location, created) = {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp();
            match state.locations.get_mut(&registration.id) {
                Some(location) => {
                    apply_ping(location, ping, &now);
                    (location.clone(), false)
                }
                None => {
                    let location = new_location(registration, &now);
                    state.locations.insert(location.id.clone(), location.clone());
                    (location, true)
                }
            }
        };

        if created {
            record_mutation("location", "create");
            info!(location_id = %location.id, "Location registered from report");
            self.bus.publish(Notification::LocationCreated(location.clone()));
        } else {
            record_mutation("location", "ping");
            debug!(location_id = %location.id, "Location pinged by report");
            self.bus.publish(Notification::LocationUpdated(location.clone()));
        }
        Ok((location, created))
    }

    /// Full copies of all three collections.
    pub async fn summary(&self) -> StoreSummary {
        let state = self.state.read().await;
        StoreSummary {
            events: state.sorted_events().into_iter().cloned().collect(),
            alerts: state.sorted_alerts().into_iter().cloned().collect(),
            locations: state.sorted_locations().into_iter().cloned().collect(),
        }
    }
}
