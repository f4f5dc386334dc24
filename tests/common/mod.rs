#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use edge_gateway::infrastructure::{
    config::{AppConfig, RuntimeMode},
    http::create_app,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

pub const CLIENT_IP: &str = "203.0.113.7";

/// Defaults for the mode with the rapid-fire check switched off, so
/// tests can send several requests from one client back to back
pub fn test_config(mode: RuntimeMode) -> AppConfig {
    let mut config = AppConfig::defaults_for(mode);
    config.security.rapid_request_threshold_ms = 0;
    config
}

/// JWT-shaped token with an unverifiable signature
pub fn unsigned_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJlLW5vdC1jaGVja2Vk")
}

/// Session token issued `issued_secs_ago`, expiring `expires_in_secs` from now
pub fn session_token(
    user_id: &str,
    roles: &[&str],
    issued_secs_ago: i64,
    expires_in_secs: i64,
) -> String {
    let now = chrono::Utc::now().timestamp();
    unsigned_token(&json!({
        "sub": user_id,
        "roles": roles,
        "iat": now - issued_secs_ago,
        "exp": now + expires_in_secs,
    }))
}

pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        let router = create_app(Arc::new(config)).unwrap();
        Self { router }
    }

    pub fn development() -> Self {
        Self::new(test_config(RuntimeMode::Development))
    }

    /// Request builder preset with the test client address
    pub fn request(method: Method, path: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(path).header("x-forwarded-for", CLIENT_IP)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        TestResponse::new(response).await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Self::request(Method::GET, path).body(Body::empty()).unwrap()).await
    }

    pub async fn get_json(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Self::request(Method::GET, path).header("accept", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        let request = Self::request(Method::POST, path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    async fn new(response: axum::response::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();

        Self { status, headers, body }
    }

    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(self.status, expected, "Response body: {}", self.body);
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn assert_hardened(&self) {
        assert_eq!(self.header("x-content-type-options"), Some("nosniff"));
        assert_eq!(self.header("x-frame-options"), Some("DENY"));
        assert!(self.header("content-security-policy").is_some());
        assert!(self.header("x-request-id").is_some());
    }
}
