//! # Hardware Ingestion Handlers
//!
//! Endpoints called by edge devices: detection reports and heartbeats.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Json,
};

use crate::error::ApiError;
use crate::handlers::types::device_id_header;
use crate::ingest::{self, DetectionReport, HeartbeatReport, IngestOutcome};
use crate::models::Location;
use crate::server::AppState;

/// Ingest a detection report
///
/// Registers unknown locations, creates an `active` event and a companion
/// `waste_detected` alert.
#[utoipa::path(
    post,
    path = "/api/hardware/events",
    params(("x-device-id" = Option<String>, Header, description = "Reporting device")),
    request_body = DetectionReport,
    responses(
        (status = 201, description = "Report accepted", body = IngestOutcome),
        (status = 400, description = "Invalid report", body = ApiError, example = json!({
            "code": "VALIDATION_FAILED",
            "message": "location_id is required",
            "trace_id": "corr-12345678"
        }))
    ),
    tag = "hardware"
)]
pub async fn ingest_event_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DetectionReport>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let Json(report) = payload?;
    let outcome = ingest::ingest_report(
        &state.store,
        report,
        device_id_header(&headers),
        state.config.report_default_confidence,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Record a device heartbeat
#[utoipa::path(
    post,
    path = "/api/hardware/heartbeat",
    params(("x-device-id" = Option<String>, Header, description = "Reporting device")),
    request_body = HeartbeatReport,
    responses(
        (status = 200, description = "Heartbeat recorded", body = Location),
        (status = 400, description = "Invalid heartbeat", body = ApiError)
    ),
    tag = "hardware"
)]
pub async fn ingest_heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<HeartbeatReport>, JsonRejection>,
) -> Result<Json<Location>, ApiError> {
    let Json(report) = payload?;
    let location = ingest::record_heartbeat(&state.store, report, device_id_header(&headers)).await?;
    Ok(Json(location))
}
