//! # Live Stream Handler
//!
//! Server-sent events: `stream_ready` first, then one named event per store
//! notification, with periodic `: keep-alive` comments.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};

use crate::server::AppState;

/// Subscribe to live store notifications
#[utoipa::path(
    get,
    path = "/api/stream",
    responses(
        (status = 200, description = "Server-sent event stream of event_created, event_updated, alert_created, alert_updated, location_created and location_updated frames", content_type = "text/event-stream", body = String)
    ),
    tag = "stream"
)]
pub async fn stream_notifications(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = state.broadcaster.connect();
    Sse::new(frames.map(|frame| Ok(frame.into_sse_event())))
}
