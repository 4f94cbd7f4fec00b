//! # Stream Broadcaster
//!
//! One long-lived server-sent-events connection per dashboard session. Each
//! connection owns a bus [`Subscription`], opens with a `stream_ready` frame,
//! forwards every notification as a named frame and emits a keep-alive
//! comment on a fixed interval. Dropping the stream (client gone) or
//! cancelling its token (shutdown) releases the subscription and the timer.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::sse::Event as SseEvent;
use futures::Stream;
use futures::stream::{self, BoxStream};
use metrics::gauge;
use serde_json::{Value, json};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{EventBus, Notification, Subscription, Topic};
use crate::clock;

/// Name of the control frame sent first on every connection.
pub const STREAM_READY_EVENT: &str = "stream_ready";

/// Comment text of keep-alive frames.
pub const KEEP_ALIVE_COMMENT: &str = "keep-alive";

/// One unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Ready { connection_id: Uuid, timestamp: String },
    Notification { topic: Topic, data: Value },
    KeepAlive,
}

impl Frame {
    pub fn from_notification(notification: &Notification) -> serde_json::Result<Self> {
        Ok(Frame::Notification {
            topic: notification.topic(),
            data: notification.payload_json()?,
        })
    }

    /// Event name, `None` for keep-alive comments.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            Frame::Ready { .. } => Some(STREAM_READY_EVENT),
            Frame::Notification { topic, .. } => Some(topic.as_str()),
            Frame::KeepAlive => None,
        }
    }

    pub fn into_sse_event(self) -> SseEvent {
        match self {
            Frame::Ready {
                connection_id,
                timestamp,
            } => SseEvent::default().event(STREAM_READY_EVENT).data(
                json!({ "connection_id": connection_id, "timestamp": timestamp }).to_string(),
            ),
            Frame::Notification { topic, data } => {
                SseEvent::default().event(topic.as_str()).data(data.to_string())
            }
            Frame::KeepAlive => SseEvent::default().comment(KEEP_ALIVE_COMMENT),
        }
    }
}

/// Decrements the live connection count however the stream ends.
struct ConnectionGuard {
    id: Uuid,
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("stream_active_connections").set(remaining as f64);
        info!(connection_id = %self.id, active_connections = remaining, "Stream connection closed");
    }
}

struct ConnectionState {
    ready: Option<Frame>,
    subscription: Subscription,
    keep_alive: Interval,
    cancel: CancellationToken,
    _guard: ConnectionGuard,
}

/// The frame sequence for a single connection.
pub struct SubscriberStream {
    id: Uuid,
    cancel: CancellationToken,
    inner: BoxStream<'static, Frame>,
}

impl SubscriberStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that ends this connection when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for SubscriberStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Hands out subscriber streams and tracks how many are live.
pub struct StreamBroadcaster {
    bus: EventBus,
    keep_alive: Duration,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl StreamBroadcaster {
    pub fn new(bus: EventBus, keep_alive: Duration, shutdown: CancellationToken) -> Self {
        Self {
            bus,
            keep_alive,
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Open a connection. The bus subscription is live before this returns.
    pub fn connect(&self) -> SubscriberStream {
        let id = Uuid::new_v4();
        let subscription = self.bus.subscribe(&Topic::ALL);
        let cancel = self.shutdown.child_token();

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("stream_active_connections").set(active as f64);
        info!(connection_id = %id, active_connections = active, "Stream connection opened");

        let mut keep_alive = tokio::time::interval_at(Instant::now() + self.keep_alive, self.keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = ConnectionState {
            ready: Some(Frame::Ready {
                connection_id: id,
                timestamp: clock::format_timestamp(chrono::Utc::now()),
            }),
            subscription,
            keep_alive,
            cancel: cancel.clone(),
            _guard: ConnectionGuard {
                id,
                active: Arc::clone(&self.active),
            },
        };

        let inner = stream::unfold(state, |mut state| async move {
            if let Some(ready) = state.ready.take() {
                return Some((ready, state));
            }

            loop {
                tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => {
                        debug!(subscriber_id = %state.subscription.id(), "Stream cancelled");
                        return None;
                    }
                    notification = state.subscription.recv() => {
                        let notification = notification?;
                        match Frame::from_notification(&notification) {
                            Ok(frame) => return Some((frame, state)),
                            Err(err) => {
                                warn!(topic = %notification.topic(), error = %err, "Skipping unserializable notification");
                            }
                        }
                    }
                    _ = state.keep_alive.tick() => return Some((Frame::KeepAlive, state)),
                }
            }
        });

        SubscriberStream {
            id,
            cancel,
            inner: Box::pin(inner),
        }
    }
}
