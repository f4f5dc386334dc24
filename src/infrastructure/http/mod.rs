use axum::{
    Router,
    http::{Method, header},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
};
use std::{
    any::Any,
    net::{AddrParseError, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, request_id::SetRequestIdLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info};

use crate::infrastructure::{
    config::AppConfig,
    upstream::{UpstreamClient, UpstreamError},
};
use crate::presentation::{
    handlers::AppState,
    middleware::{
        AppError, EdgePipeline, GatewayRequestId, PipelineError, edge_middleware,
        request_id::sanitize_request_id,
    },
    routes,
};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to build security pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Invalid bind address: {0}")]
    Address(#[from] AddrParseError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Create the gateway router with a pipeline built from the configuration
pub fn create_app(config: Arc<AppConfig>) -> Result<Router, ServerError> {
    let pipeline = Arc::new(EdgePipeline::from_config(&config)?);
    create_app_with_pipeline(config, pipeline)
}

/// Create the gateway router around an existing pipeline
pub fn create_app_with_pipeline(
    config: Arc<AppConfig>,
    pipeline: Arc<EdgePipeline>,
) -> Result<Router, ServerError> {
    let upstream = match config.server.upstream_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => Some(Arc::new(UpstreamClient::new(
            url,
            config.server.request_timeout(),
            usize::try_from(config.server.max_upload_size).unwrap_or(usize::MAX),
        )?)),
        None => None,
    };

    let middleware_stack = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(sanitize_request_id))
        .layer(SetRequestIdLayer::x_request_id(GatewayRequestId))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.server.request_timeout()));

    let app_state = AppState { config, upstream };

    // The fallback is registered before the layers so it runs behind the pipeline too.
    // CORS and handler panics sit inside the pipeline so their responses get hardened.
    Ok(routes::create_routes(app_state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(create_cors_layer())
        .layer(from_fn_with_state(pipeline, edge_middleware))
        .layer(middleware_stack))
}

/// Render a panic as the same 500 body the pipeline uses for internal failures
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = message, "Request handler panicked");
    AppError::Internal { message: message.to_string() }.into_response()
}

/// Create CORS layer with appropriate settings
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any) // TODO: Configure specific origins in production
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            header::HeaderName::from_static("x-request-id"),
            header::HeaderName::from_static("x-ratelimit-limit"),
            header::HeaderName::from_static("x-ratelimit-remaining"),
            header::HeaderName::from_static("x-ratelimit-reset"),
        ])
        .max_age(Duration::from_secs(3600))
}

/// Start the HTTP server
///
/// # Errors
/// Returns an error if the pipeline cannot be built or the server fails to start
pub async fn start_server(config: AppConfig) -> Result<(), ServerError> {
    let config = Arc::new(config);
    let addr = config.server.socket_addr()?;
    let app = create_app(Arc::clone(&config))?;

    info!(
        mode = %config.mode,
        upstream = config.server.upstream_url.as_deref().unwrap_or("none"),
        "Starting edge gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
