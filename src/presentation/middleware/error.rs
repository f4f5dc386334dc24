use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use super::rate_limit::RateLimitDecision;
use crate::domain::repositories::StoreError;
use crate::infrastructure::upstream::UpstreamError;

/// Every terminal response the pipeline can produce instead of forwarding
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Development route is disabled")]
    DevRouteDisabled,

    #[error("Cookie security violation: {issues:?}")]
    CookieSecurity { issues: Vec<String> },

    #[error("Rate limit exceeded (limit {})", decision.limit)]
    RateLimited { decision: RateLimitDecision },

    #[error("Security violation: {message}")]
    SecurityViolation { message: String },

    #[error("XSS detected: {message}")]
    XssDetected { message: String },

    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    #[error("Redirecting to login: {location}")]
    LoginRedirect { location: String },

    #[error("Insufficient permissions: {message}")]
    InsufficientPermissions { message: String },

    #[error("Client blocked after repeated violations ({event})")]
    ClientBlocked { event: &'static str, retry_after: u64 },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Upstream error: {message}")]
    Upstream { message: String },
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DevRouteDisabled => StatusCode::NOT_FOUND,
            AppError::CookieSecurity { .. } => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::SecurityViolation { .. }
            | AppError::XssDetected { .. }
            | AppError::InsufficientPermissions { .. }
            | AppError::ClientBlocked { .. } => StatusCode::FORBIDDEN,
            AppError::AuthenticationRequired { .. } => StatusCode::UNAUTHORIZED,
            AppError::LoginRedirect { .. } => StatusCode::FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable code carried in the JSON body
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            AppError::DevRouteDisabled | AppError::LoginRedirect { .. } => None,
            AppError::CookieSecurity { .. } => Some("COOKIE_SECURITY_VIOLATION"),
            AppError::RateLimited { .. } => Some("RATE_LIMIT_EXCEEDED"),
            AppError::SecurityViolation { .. } => Some("SECURITY_VIOLATION"),
            AppError::XssDetected { .. } => Some("XSS_DETECTED"),
            AppError::AuthenticationRequired { .. } => Some("AUTH_REQUIRED"),
            AppError::InsufficientPermissions { .. } => Some("INSUFFICIENT_PERMISSIONS"),
            AppError::ClientBlocked { .. } => Some("CLIENT_BLOCKED"),
            AppError::Internal { .. } => Some("MIDDLEWARE_ERROR"),
            AppError::Upstream { .. } => Some("UPSTREAM_ERROR"),
        }
    }

    /// Check if this error should be logged as an error (vs warning)
    pub fn should_log_as_error(&self) -> bool {
        matches!(self, AppError::Internal { .. } | AppError::Upstream { .. })
    }

    fn body(&self, request_id: &str) -> Option<Value> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let code = self.error_code();

        match self {
            AppError::DevRouteDisabled | AppError::LoginRedirect { .. } => None,
            AppError::CookieSecurity { .. } => Some(json!({
                "success": false,
                "error": "Security violation detected",
                "code": code,
                "requestId": request_id,
                "timestamp": timestamp,
            })),
            AppError::RateLimited { decision } => {
                let retry_after = decision.retry_after.unwrap_or(1);
                Some(json!({
                    "error": "Too Many Requests",
                    "message": format!("Rate limit exceeded. Try again in {retry_after} seconds."),
                    "retryAfter": retry_after,
                }))
            }
            AppError::SecurityViolation { message } | AppError::XssDetected { message } => {
                Some(json!({
                    "error": "Request blocked",
                    "message": message,
                    "code": code,
                }))
            }
            AppError::AuthenticationRequired { .. } => Some(json!({
                "success": false,
                "error": "Authentication required",
                "code": code,
                "requestId": request_id,
                "timestamp": timestamp,
            })),
            AppError::InsufficientPermissions { .. } => Some(json!({
                "success": false,
                "error": "Insufficient permissions",
                "code": code,
                "requestId": request_id,
                "timestamp": timestamp,
            })),
            AppError::ClientBlocked { retry_after, .. } => Some(json!({
                "error": "Request blocked",
                "message": format!(
                    "Too many security violations. Try again in {retry_after} seconds."
                ),
                "code": code,
                "retryAfter": retry_after,
            })),
            AppError::Internal { .. } => Some(json!({
                "error": "Internal Server Error",
                "message": "An unexpected error occurred",
                "code": code,
                "requestId": request_id,
            })),
            AppError::Upstream { .. } => Some(json!({
                "error": "Bad Gateway",
                "message": "Upstream service unavailable",
                "code": code,
                "requestId": request_id,
            })),
        }
    }

    /// Render the response for a known request id
    pub fn into_response_for(self, request_id: &str) -> Response {
        let status = self.status_code();

        if self.should_log_as_error() {
            error!(request_id, error_code = self.error_code(), "Pipeline error: {}", self);
        } else {
            warn!(request_id, error_code = self.error_code(), "Request rejected: {}", self);
        }

        let mut response = match self.body(request_id) {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        };

        match &self {
            AppError::RateLimited { decision } => decision.add_headers(response.headers_mut()),
            AppError::LoginRedirect { location } => {
                if let Ok(value) = HeaderValue::from_str(location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
            }
            AppError::ClientBlocked { retry_after, .. } => {
                response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            _ => {}
        }

        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_for(&Uuid::new_v4().to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal { message: err.to_string() }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        AppError::Upstream { message: err.to_string() }
    }
}
