//! # Location Handlers

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};

use crate::error::{ApiError, not_found};
use crate::handlers::types::LocationListResponse;
use crate::models::{Location, LocationUpsert};
use crate::server::AppState;

/// List monitored locations ordered by name
#[utoipa::path(
    get,
    path = "/api/locations",
    responses(
        (status = 200, description = "Locations listed", body = LocationListResponse)
    ),
    tag = "locations"
)]
pub async fn list_locations(State(state): State<AppState>) -> Json<LocationListResponse> {
    Json(state.store.list_locations().await.into())
}

/// Fetch one location
#[utoipa::path(
    get,
    path = "/api/locations/{id}",
    params(("id" = String, Path, description = "Location id")),
    responses(
        (status = 200, description = "Location found", body = Location),
        (status = 404, description = "Location not found", body = ApiError)
    ),
    tag = "locations"
)]
pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Location>, ApiError> {
    state
        .store
        .get_location(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("location", &id))
}

/// Register a location or update an existing one
///
/// Provided fields replace stored ones; `null` clears `address` or `coordinates`.
#[utoipa::path(
    post,
    path = "/api/locations",
    request_body = LocationUpsert,
    responses(
        (status = 200, description = "Location stored", body = Location),
        (status = 400, description = "Invalid location", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "id is required",
            "trace_id": "corr-12345678"
        }))
    ),
    tag = "locations"
)]
pub async fn upsert_location(
    State(state): State<AppState>,
    payload: Result<Json<LocationUpsert>, JsonRejection>,
) -> Result<Json<Location>, ApiError> {
    let Json(fields) = payload?;
    let location = state.store.upsert_location(fields).await?;
    Ok(Json(location))
}
