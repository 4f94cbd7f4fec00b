//! # Event Bus
//!
//! In-process publish/subscribe for store notifications. The store publishes
//! after every committed mutation; listeners hold a [`Subscription`] and
//! receive only what is published after they subscribed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Alert, Event, Location};

/// Notification topics carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    EventCreated,
    EventUpdated,
    AlertCreated,
    AlertUpdated,
    LocationCreated,
    LocationUpdated,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::EventCreated,
        Topic::EventUpdated,
        Topic::AlertCreated,
        Topic::AlertUpdated,
        Topic::LocationCreated,
        Topic::LocationUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::EventCreated => "event_created",
            Topic::EventUpdated => "event_updated",
            Topic::AlertCreated => "alert_created",
            Topic::AlertUpdated => "alert_updated",
            Topic::LocationCreated => "location_created",
            Topic::LocationUpdated => "location_updated",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed store mutation. The payload is a copy of the entity after the change.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    EventCreated(Event),
    EventUpdated(Event),
    AlertCreated(Alert),
    AlertUpdated(Alert),
    LocationCreated(Location),
    LocationUpdated(Location),
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::EventCreated(_) => Topic::EventCreated,
            Notification::EventUpdated(_) => Topic::EventUpdated,
            Notification::AlertCreated(_) => Topic::AlertCreated,
            Notification::AlertUpdated(_) => Topic::AlertUpdated,
            Notification::LocationCreated(_) => Topic::LocationCreated,
            Notification::LocationUpdated(_) => Topic::LocationUpdated,
        }
    }

    /// Serialize the carried entity as JSON.
    pub fn payload_json(&self) -> serde_json::Result<Value> {
        match self {
            Notification::EventCreated(event) | Notification::EventUpdated(event) => {
                serde_json::to_value(event)
            }
            Notification::AlertCreated(alert) | Notification::AlertUpdated(alert) => {
                serde_json::to_value(alert)
            }
            Notification::LocationCreated(location) | Notification::LocationUpdated(location) => {
                serde_json::to_value(location)
            }
        }
    }
}

struct Subscriber {
    topics: Vec<Topic>,
    tx: UnboundedSender<Notification>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

impl BusInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Subscriber>> {
        // A panic while holding the registry lock leaves the map itself intact.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: &Uuid) -> bool {
        self.lock().remove(id).is_some()
    }
}

/// Cloneable handle to the shared bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `notification` to every current subscriber of its topic.
    ///
    /// Never blocks and never fails: a subscriber whose receiver is gone is
    /// logged, counted and dropped from the registry without affecting the rest.
    pub fn publish(&self, notification: Notification) {
        let topic = notification.topic();
        counter!("bus_notifications_published_total", "topic" => topic.as_str()).increment(1);

        let targets: Vec<(Uuid, UnboundedSender<Notification>)> = self
            .inner
            .lock()
            .iter()
            .filter(|(_, subscriber)| subscriber.topics.contains(&topic))
            .map(|(id, subscriber)| (*id, subscriber.tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.send(notification.clone()).is_err() {
                counter!("bus_dispatch_failures_total").increment(1);
                warn!(subscriber_id = %id, topic = %topic, "Dropping subscriber with closed receiver");
                dead.push(id);
            }
        }

        for id in dead {
            self.inner.remove(&id);
        }

        debug!(topic = %topic, "Notification published");
    }

    /// Register a listener for `topics`. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner.lock().insert(
            id,
            Subscriber {
                topics: topics.to_vec(),
                tx,
            },
        );
        debug!(subscriber_id = %id, topics = topics.len(), "Subscriber registered");

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Receiving side of a bus registration.
pub struct Subscription {
    id: Uuid,
    rx: UnboundedReceiver<Notification>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next notification. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Take a pending notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() && bus.remove(&self.id) {
            debug!(subscriber_id = %self.id, "Subscriber removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
