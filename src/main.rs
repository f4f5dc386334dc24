#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use edge_gateway::infrastructure::{
    config::{AppConfig, LogFormat, LoggingConfig, RuntimeMode},
    http::start_server,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Local overrides first so they win over .env
    let development = std::env::var("RUN_MODE")
        .ok()
        .and_then(|mode| mode.parse::<RuntimeMode>().ok())
        .is_none_or(|mode| mode == RuntimeMode::Development);
    if development {
        dotenvy::from_filename(".env.local").ok();
    }
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    // Initialize logging
    init_tracing(&config.logging);

    info!("Starting Edge Gateway in {} mode", config.mode);

    // Start the HTTP server
    if let Err(e) = start_server(config).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// Initialize structured logging
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("edge_gateway={level},tower_http={level}", level = logging.level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
    }
}
