use axum::{Router, routing::get};

use crate::presentation::handlers::{self, AppState};

/// Gateway-owned routes plus the upstream fallback
pub fn create_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/gateway/health", get(handlers::health::gateway_health))
        .fallback(handlers::proxy::proxy_request)
        .with_state(app_state)
}
