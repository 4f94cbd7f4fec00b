//! # Event Handlers
//!
//! List, fetch and update detection events.

use axum::{
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::config::PaginationConfig;
use crate::error::{ApiError, not_found};
use crate::handlers::types::{AlertListResponse, EventListResponse, parse_status};
use crate::models::{Event, EventFilter, EventPatch, EventStatus};
use crate::server::AppState;

/// Query parameters for listing events
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListEventsQuery {
    /// Filter by status (pending, active, investigating, resolved, false_positive)
    pub status: Option<String>,
    /// Filter by location id
    pub location_id: Option<String>,
    /// Page size (default 50; negative values clamp to 0, large values to the configured max)
    pub limit: Option<i64>,
    /// Number of events to skip (negative values clamp to 0)
    pub offset: Option<i64>,
}

/// List events, newest first
#[utoipa::path(
    get,
    path = "/api/events",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "Events listed", body = EventListResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "invalid event status 'closed'; expected one of pending, active, investigating, resolved, false_positive",
            "trace_id": "corr-12345678"
        }))
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<ListEventsQuery>, QueryRejection>,
) -> Result<Json<EventListResponse>, ApiError> {
    let Query(query) = query?;
    let pagination = &state.config.pagination;

    let filter = EventFilter {
        status: parse_status::<EventStatus>("status", query.status.as_deref())?,
        location_id: query.location_id.filter(|id| !id.is_empty()),
        limit: pagination.resolve_limit(query.limit),
        offset: PaginationConfig::resolve_offset(query.offset),
    };

    Ok(Json(state.store.list_events(&filter).await.into()))
}

/// Fetch one event
#[utoipa::path(
    get,
    path = "/api/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event found", body = Event),
        (status = 404, description = "Event not found", body = ApiError)
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    state
        .store
        .get_event(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("event", &id))
}

/// Partially update an event
///
/// Setting `status` to `resolved` stamps `resolved_at` unless one is supplied.
/// `metadata` is merged key-wise; `null` clears `coordinates`, `image_url` or `video_url`.
#[utoipa::path(
    patch,
    path = "/api/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    request_body = EventPatch,
    responses(
        (status = 200, description = "Event updated", body = Event),
        (status = 400, description = "Invalid update", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "confidence_score must be within [0, 1], got 1.4",
            "trace_id": "corr-12345678"
        })),
        (status = 404, description = "Event not found", body = ApiError)
    ),
    tag = "events"
)]
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<EventPatch>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let Json(patch) = payload?;
    let event = state.store.update_event(&id, patch).await?;
    Ok(Json(event))
}

/// List the alerts raised for an event
#[utoipa::path(
    get,
    path = "/api/events/{id}/alerts",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Alerts for the event", body = AlertListResponse),
        (status = 404, description = "Event not found", body = ApiError)
    ),
    tag = "events"
)]
pub async fn list_event_alerts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AlertListResponse>, ApiError> {
    if state.store.get_event(&id).await.is_none() {
        return Err(not_found("event", &id));
    }
    Ok(Json(state.store.get_alerts_by_event_id(&id).await.into()))
}
