//! # Alert Handlers

use axum::{
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ApiError, not_found};
use crate::handlers::types::{AlertListResponse, device_id_header, parse_status};
use crate::models::{Alert, AlertFilter, AlertPatch, AlertStatus};
use crate::server::AppState;

/// Query parameters for listing alerts
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAlertsQuery {
    /// Filter by status (pending, sent, failed, acknowledged, active)
    pub status: Option<String>,
    /// Only alerts whose event belongs to this location
    pub location_id: Option<String>,
    /// Maximum number of alerts (default 50)
    pub limit: Option<i64>,
}

/// List alerts, newest first
#[utoipa::path(
    get,
    path = "/api/alerts",
    params(ListAlertsQuery),
    responses(
        (status = 200, description = "Alerts listed", body = AlertListResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    query: Result<Query<ListAlertsQuery>, QueryRejection>,
) -> Result<Json<AlertListResponse>, ApiError> {
    let Query(query) = query?;

    let filter = AlertFilter {
        status: parse_status::<AlertStatus>("status", query.status.as_deref())?,
        location_id: query.location_id.filter(|id| !id.is_empty()),
        limit: state.config.pagination.resolve_limit(query.limit),
    };

    Ok(Json(state.store.list_alerts(&filter).await.into()))
}

/// Fetch one alert
#[utoipa::path(
    get,
    path = "/api/alerts/{id}",
    params(("id" = String, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert found", body = Alert),
        (status = 404, description = "Alert not found", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    state
        .store
        .get_alert(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("alert", &id))
}

/// Partially update an alert
///
/// Acknowledging records `metadata.acknowledged_at` and `metadata.acknowledged_by`;
/// the actor is `acknowledged_by`, then the `x-device-id` header, then `dashboard`.
#[utoipa::path(
    patch,
    path = "/api/alerts/{id}",
    params(
        ("id" = String, Path, description = "Alert id"),
        ("x-device-id" = Option<String>, Header, description = "Acting device, used when no acknowledged_by is given")
    ),
    request_body = AlertPatch,
    responses(
        (status = 200, description = "Alert updated", body = Alert),
        (status = 400, description = "Invalid update", body = ApiError),
        (status = 404, description = "Alert not found", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn update_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<AlertPatch>, JsonRejection>,
) -> Result<Json<Alert>, ApiError> {
    let Json(patch) = payload?;
    let device_id = device_id_header(&headers).map(str::to_string);
    let alert = state.store.update_alert(&id, patch, device_id).await?;
    Ok(Json(alert))
}
