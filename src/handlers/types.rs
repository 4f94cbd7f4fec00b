//! # Common API Types
//!
//! This module contains shared types used across multiple API handlers,
//! including list response wrappers and query parsing helpers.

use std::str::FromStr;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{ApiError, validation_error};
use crate::ingest::DEVICE_ID_HEADER;
use crate::models::{Alert, Event, Location};

/// Response payload for event listings
#[derive(Debug, Serialize, ToSchema)]
pub struct EventListResponse {
    /// Events for the requested page, newest first
    pub events: Vec<Event>,
    /// Number of events in this page
    pub count: usize,
}

impl From<Vec<Event>> for EventListResponse {
    fn from(events: Vec<Event>) -> Self {
        Self {
            count: events.len(),
            events,
        }
    }
}

/// Response payload for alert listings
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertListResponse {
    /// Alerts, newest first
    pub alerts: Vec<Alert>,
    pub count: usize,
}

impl From<Vec<Alert>> for AlertListResponse {
    fn from(alerts: Vec<Alert>) -> Self {
        Self {
            count: alerts.len(),
            alerts,
        }
    }
}

/// Response payload for location listings
#[derive(Debug, Serialize, ToSchema)]
pub struct LocationListResponse {
    /// Locations ordered by name
    pub locations: Vec<Location>,
    pub count: usize,
}

impl From<Vec<Location>> for LocationListResponse {
    fn from(locations: Vec<Location>) -> Self {
        Self {
            count: locations.len(),
            locations,
        }
    }
}

/// Parse an optional status query parameter into its enum.
pub fn parse_status<T>(field: &str, raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = String>,
{
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|message: String| validation_error(&message, json!({ field: message.clone() }))),
    }
}

/// The `x-device-id` header, when present and valid UTF-8.
pub fn device_id_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
}
