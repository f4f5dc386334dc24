use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::presentation::middleware::{error::AppError, request_id::REQUEST_ID_HEADER};

/// Fallback for every request the pipeline allowed through
pub async fn proxy_request(State(state): State<AppState>, request: Request) -> Response {
    let Some(upstream) = state.upstream.as_ref() else {
        return not_found();
    };

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    match upstream.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Upstream request failed");
            AppError::from(e).into_response_for(&request_id)
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": "The requested resource was not found"
        })),
    )
        .into_response()
}
