//! # Summary Handler

use axum::{extract::State, response::Json};

use crate::server::AppState;
use crate::store::StoreSummary;

/// Snapshot of every event, alert and location
#[utoipa::path(
    get,
    path = "/api/summary",
    responses(
        (status = 200, description = "Full store snapshot", body = StoreSummary)
    ),
    tag = "events"
)]
pub async fn get_summary(State(state): State<AppState>) -> Json<StoreSummary> {
    Json(state.store.summary().await)
}
