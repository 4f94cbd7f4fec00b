//! # Dumpwatch Main Entry Point
//!
//! This is the main entry point for the dumpwatch service.

use dumpwatch::{config::ConfigLoader, server::run_server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "Effective configuration");
    }

    // Start the server with the loaded configuration
    run_server(config).await
}
