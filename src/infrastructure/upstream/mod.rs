use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, header, uri::PathAndQuery},
    response::Response,
};
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to read request body: {message}")]
    Body { message: String },
}

// Connection-scoped headers that must not be forwarded by a proxy
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Reverse proxy to the dashboard frontend
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    http_client: HttpClient,
    max_body_bytes: usize,
}

impl UpstreamClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, UpstreamError> {
        // Validate once up front so per-request joins cannot fail on the base
        url::Url::parse(base_url)?;

        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            max_body_bytes,
        })
    }

    pub fn target_url(&self, path_and_query: &str) -> Result<url::Url, UpstreamError> {
        Ok(url::Url::parse(&format!("{}{path_and_query}", self.base_url))?)
    }

    /// Forward a request and relay the upstream response
    pub async fn forward(&self, request: Request) -> Result<Response, UpstreamError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts.uri.path_and_query().map_or("/", PathAndQuery::as_str);
        let url = self.target_url(path_and_query)?;

        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| UpstreamError::Body { message: e.to_string() })?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        debug!(method = %parts.method, url = %url, "Proxying request upstream");

        let upstream = self
            .http_client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}
