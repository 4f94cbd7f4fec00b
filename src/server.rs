//! # Server Configuration
//!
//! This module contains the server setup for the dumpwatch API: shared state,
//! router assembly, middleware and graceful shutdown.

use std::sync::Arc;

use axum::{
    Router, middleware,
    http::HeaderValue,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::bus::EventBus;
use crate::config::AppConfig;
use crate::handlers;
use crate::store::EntityStore;
use crate::stream::StreamBroadcaster;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<EntityStore>,
    pub broadcaster: Arc<StreamBroadcaster>,
}

impl AppState {
    /// Wire a fresh store and broadcaster onto one bus. Cancelling `shutdown`
    /// ends every open stream.
    pub fn new(config: AppConfig, shutdown: CancellationToken) -> Self {
        let bus = EventBus::new();
        let store = Arc::new(EntityStore::with_system_clock(bus.clone()));
        let broadcaster = Arc::new(StreamBroadcaster::new(
            bus,
            config.stream.keep_alive(),
            shutdown,
        ));

        Self {
            config: Arc::new(config),
            store,
            broadcaster,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/events", get(handlers::events::list_events))
        .route(
            "/api/events/{id}",
            get(handlers::events::get_event).patch(handlers::events::update_event),
        )
        .route(
            "/api/events/{id}/alerts",
            get(handlers::events::list_event_alerts),
        )
        .route("/api/alerts", get(handlers::alerts::list_alerts))
        .route(
            "/api/alerts/{id}",
            get(handlers::alerts::get_alert).patch(handlers::alerts::update_alert),
        )
        .route(
            "/api/locations",
            get(handlers::locations::list_locations).post(handlers::locations::upsert_location),
        )
        .route(
            "/api/locations/{id}",
            get(handlers::locations::get_location),
        )
        .route(
            "/api/hardware/events",
            post(handlers::reports::ingest_event_report),
        )
        .route(
            "/api/hardware/heartbeat",
            post(handlers::reports::ingest_heartbeat),
        )
        .route("/api/summary", get(handlers::summary::get_summary))
        .route("/api/stream", get(handlers::stream::stream_notifications))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
}

/// Starts the server with the given configuration
///
/// Ctrl-C cancels the root token: open streams end and in-flight requests drain.
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(config, shutdown.clone());
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %profile, "Server listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
            Err(err) => error!(error = %err, "Failed to listen for shutdown signal"),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::events::list_events,
        crate::handlers::events::get_event,
        crate::handlers::events::update_event,
        crate::handlers::events::list_event_alerts,
        crate::handlers::alerts::list_alerts,
        crate::handlers::alerts::get_alert,
        crate::handlers::alerts::update_alert,
        crate::handlers::locations::list_locations,
        crate::handlers::locations::get_location,
        crate::handlers::locations::upsert_location,
        crate::handlers::reports::ingest_event_report,
        crate::handlers::reports::ingest_heartbeat,
        crate::handlers::summary::get_summary,
        crate::handlers::stream::stream_notifications,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::Coordinates,
            crate::models::Metadata,
            crate::models::Event,
            crate::models::EventStatus,
            crate::models::EventPatch,
            crate::models::Alert,
            crate::models::AlertStatus,
            crate::models::AlertPatch,
            crate::models::Location,
            crate::models::LocationUpsert,
            crate::ingest::DetectionReport,
            crate::ingest::HeartbeatReport,
            crate::ingest::IngestOutcome,
            crate::store::StoreSummary,
            crate::handlers::types::EventListResponse,
            crate::handlers::types::AlertListResponse,
            crate::handlers::types::LocationListResponse,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "events", description = "Detection events"),
        (name = "alerts", description = "Operator alerts"),
        (name = "locations", description = "Monitored locations"),
        (name = "hardware", description = "Device report and heartbeat ingestion"),
        (name = "stream", description = "Live notification stream"),
    ),
    info(
        title = "Dumpwatch API",
        description = "Detection events, alerts and monitored locations with a live notification stream",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
