use axum::http::{HeaderMap, Method, Uri, header};
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::value_objects::RouteClass;

/// Client identifier used when neither forwarding headers nor the socket give one
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Read-only view of an incoming request, built once at pipeline entry
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub client_ip: String,
    pub user_agent: String,
    pub is_https: bool,
    pub route: RouteClass,
    /// Buffered body; only read for methods that carry one
    pub body: Option<Bytes>,
    /// The body was larger than the buffering limit and was not read
    pub body_over_limit: bool,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded_proto: bool,
    ) -> Self {
        let request_id = headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let is_https = uri.scheme_str() == Some("https")
            || (trust_forwarded_proto && forwarded_proto_is_https(&headers));
        let client_ip = extract_client_ip(&headers, peer);
        let path = uri.path().to_string();

        Self {
            request_id,
            route: RouteClass::classify(&path),
            method,
            path,
            query: uri.query().map(str::to_string),
            headers,
            client_ip,
            user_agent,
            is_https,
            body: None,
            body_over_limit: false,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_body_over_limit(mut self) -> Self {
        self.body = None;
        self.body_over_limit = true;
        self
    }

    /// Percent-decoded query parameters in order of appearance
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Browser navigation rather than an API call
    pub fn accepts_html(&self) -> bool {
        self.header(header::ACCEPT.as_str()).is_some_and(|accept| accept.contains("text/html"))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Body length as declared by `Content-Length`
    pub fn declared_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str()).and_then(|value| value.trim().parse().ok())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Methods whose body is buffered and inspected
pub fn method_carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn forwarded_proto_is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// Resolve the client identifier from forwarding headers, then the socket
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // Take the first hop of X-Forwarded-For (the original client)
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return ip.to_string();
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
    {
        return ip.to_string();
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(extract_client_ip(&map, None), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_peer() {
        let map = headers(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(extract_client_ip(&map, None), "198.51.100.2");

        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.1");
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_context_fields() {
        let uri: Uri = "/api/v1/users?page=2&q=a%20b".parse().unwrap();
        let ctx = RequestContext::new(
            Method::GET,
            &uri,
            headers(&[
                ("user-agent", "Mozilla/5.0"),
                ("accept", "text/html,application/xhtml+xml"),
                ("x-request-id", "req-1"),
            ]),
            None,
            true,
        );

        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.path, "/api/v1/users");
        assert_eq!(ctx.user_agent, "Mozilla/5.0");
        assert!(ctx.accepts_html());
        assert!(ctx.route.api_protected);
        assert_eq!(
            ctx.query_pairs(),
            vec![("page".to_string(), "2".to_string()), ("q".to_string(), "a b".to_string())]
        );
    }

    #[test]
    fn test_https_detection() {
        let uri: Uri = "/".parse().unwrap();
        let forwarded = headers(&[("x-forwarded-proto", "https")]);

        assert!(RequestContext::new(Method::GET, &uri, forwarded.clone(), None, true).is_https);
        assert!(!RequestContext::new(Method::GET, &uri, forwarded, None, false).is_https);

        let absolute: Uri = "https://dashboard.example.com/".parse().unwrap();
        let ctx = RequestContext::new(Method::GET, &absolute, HeaderMap::new(), None, false);
        assert!(ctx.is_https);
    }

    #[test]
    fn test_generated_request_id_when_missing() {
        let uri: Uri = "/".parse().unwrap();
        let ctx = RequestContext::new(Method::GET, &uri, HeaderMap::new(), None, true);
        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }

    #[test]
    fn test_method_carries_body() {
        assert!(method_carries_body(&Method::POST));
        assert!(method_carries_body(&Method::PATCH));
        assert!(!method_carries_body(&Method::GET));
        assert!(!method_carries_body(&Method::OPTIONS));
    }
}
