use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::debug;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LENGTH: usize = 128;

/// UUID v4 request ids for requests that arrive without a usable one
#[derive(Clone, Copy, Debug, Default)]
pub struct GatewayRequestId;

impl MakeRequestId for GatewayRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let header_value = HeaderValue::try_from(Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(header_value))
    }
}

/// Client-supplied ids end up in logs and response headers
pub fn is_acceptable_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LENGTH
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Drop an unusable incoming `X-Request-ID` so a fresh one is generated downstream.
/// Runs outside `SetRequestIdLayer`.
pub async fn sanitize_request_id(mut request: Request, next: Next) -> Response {
    let unusable = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .is_some_and(|value| !value.to_str().is_ok_and(is_acceptable_request_id));

    if unusable {
        debug!("Discarding malformed client request id");
        request.headers_mut().remove(REQUEST_ID_HEADER);
    }

    next.run(request).await
}
