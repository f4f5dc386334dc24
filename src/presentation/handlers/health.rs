use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::AppState;

/// Liveness check for the gateway itself
pub async fn gateway_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "edge-gateway",
        "mode": state.config.mode.to_string(),
        "upstream": if state.upstream.is_some() { "configured" } else { "not_configured" },
    }))
}
