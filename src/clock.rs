//! # Clock and identifier provider
//!
//! Supplies the timestamps stamped onto store records and the opaque ids
//! assigned to new events and alerts.
//!
//! Timestamps are rendered as RFC 3339 strings in UTC with a fixed millisecond
//! precision and a `Z` suffix, so plain string comparison orders them
//! chronologically. The store sorts on these strings directly.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use uuid::Uuid;

use crate::models::Timestamp;

/// Source of "now" for the entity store.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant rendered in the store's timestamp format.
    fn timestamp(&self) -> Timestamp {
        format_timestamp(self.now())
    }
}

/// Render an instant in the store's lexicographically sortable format.
pub fn format_timestamp(instant: DateTime<Utc>) -> Timestamp {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a new globally unique identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Wall clock that never goes backwards.
///
/// If the system clock steps back (NTP adjustment), the last issued instant is
/// reused so `updated_at` never precedes `detected_at`.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_millis: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let previous = self.last_millis.fetch_max(wall, Ordering::SeqCst);
        let millis = previous.max(wall);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

/// Manually driven clock for tests and deterministic replays.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *current += step;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *current = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
