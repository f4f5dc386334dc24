use axum::{
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};

use super::auth::UserContext;
use crate::domain::entities::RequestContext;
use crate::infrastructure::config::RuntimeMode;

pub const NONCE_PLACEHOLDER: &str = "{nonce}";

/// Security headers configuration
#[derive(Debug, Clone)]
pub struct SecurityHeadersConfig {
    /// HSTS max age in seconds
    pub hsts_max_age: u64,
    pub hsts_include_subdomains: bool,
    pub hsts_preload: bool,
    /// Content Security Policy with `{nonce}` placeholders
    pub csp_template: String,
    pub frame_options: FrameOptions,
    pub xss_protection: XssProtection,
    pub referrer_policy: ReferrerPolicy,
    pub permissions_policy: String,
}

impl SecurityHeadersConfig {
    /// Allows inline evaluation and local dev-server websockets
    pub fn development() -> Self {
        Self {
            hsts_max_age: 31_536_000,
            hsts_include_subdomains: true,
            hsts_preload: false,
            csp_template: "default-src 'self'; script-src 'self' 'nonce-{nonce}' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; img-src 'self' data: blob:; font-src 'self' data:; connect-src 'self' http://localhost:* ws://localhost:*; object-src 'none'; frame-ancestors 'none'; base-uri 'self'"
                .to_string(),
            frame_options: FrameOptions::Deny,
            xss_protection: XssProtection::Block,
            referrer_policy: ReferrerPolicy::StrictOriginWhenCrossOrigin,
            permissions_policy: "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()"
                .to_string(),
        }
    }

    pub fn production() -> Self {
        Self {
            hsts_preload: true,
            csp_template: "default-src 'self'; script-src 'self' 'nonce-{nonce}' 'strict-dynamic'; style-src 'self' 'nonce-{nonce}'; img-src 'self' data: https:; font-src 'self'; connect-src 'self'; object-src 'none'; frame-ancestors 'none'; form-action 'self'; base-uri 'self'; upgrade-insecure-requests"
                .to_string(),
            ..Self::development()
        }
    }

    pub fn for_mode(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::Development => Self::development(),
            RuntimeMode::Production => Self::production(),
        }
    }

    fn hsts_value(&self) -> String {
        let mut value = format!("max-age={}", self.hsts_max_age);
        if self.hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.hsts_preload {
            value.push_str("; preload");
        }
        value
    }
}

/// X-Frame-Options values
#[derive(Debug, Clone, Copy)]
pub enum FrameOptions {
    Deny,
    SameOrigin,
}

impl FrameOptions {
    fn to_header_value(self) -> HeaderValue {
        match self {
            FrameOptions::Deny => HeaderValue::from_static("DENY"),
            FrameOptions::SameOrigin => HeaderValue::from_static("SAMEORIGIN"),
        }
    }
}

/// X-XSS-Protection values
#[derive(Debug, Clone, Copy)]
pub enum XssProtection {
    Disabled,
    Enabled,
    Block,
}

impl XssProtection {
    fn to_header_value(self) -> HeaderValue {
        match self {
            XssProtection::Disabled => HeaderValue::from_static("0"),
            XssProtection::Enabled => HeaderValue::from_static("1"),
            XssProtection::Block => HeaderValue::from_static("1; mode=block"),
        }
    }
}

/// Referrer-Policy values
#[derive(Debug, Clone, Copy)]
pub enum ReferrerPolicy {
    NoReferrer,
    SameOrigin,
    StrictOrigin,
    StrictOriginWhenCrossOrigin,
}

impl ReferrerPolicy {
    fn to_header_value(self) -> HeaderValue {
        let value = match self {
            ReferrerPolicy::NoReferrer => "no-referrer",
            ReferrerPolicy::SameOrigin => "same-origin",
            ReferrerPolicy::StrictOrigin => "strict-origin",
            ReferrerPolicy::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
        };
        HeaderValue::from_static(value)
    }
}

/// Fresh 128-bit nonce, base64 encoded
pub fn generate_nonce() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Decorates every response the pipeline produces, including rejections
#[derive(Debug, Clone)]
pub struct ResponseComposer {
    config: SecurityHeadersConfig,
}

impl ResponseComposer {
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self { config }
    }

    pub fn compose(
        &self,
        ctx: &RequestContext,
        mut response: Response,
        user: Option<&UserContext>,
    ) -> Response {
        let headers = response.headers_mut();
        self.apply_security_headers(headers, ctx.is_https);

        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert("x-request-id", value);
        }
        let elapsed = format!("{}ms", ctx.elapsed().as_millis());
        if let Ok(value) = HeaderValue::from_str(&elapsed) {
            headers.insert("x-processing-time", value);
        }

        if let Some(user) = user {
            user.apply_headers(headers);
        }

        response
    }

    fn apply_security_headers(&self, headers: &mut HeaderMap, is_https: bool) {
        let nonce = generate_nonce();
        let csp = self.config.csp_template.replace(NONCE_PLACEHOLDER, &nonce);
        if let Ok(value) = HeaderValue::from_str(&csp) {
            headers.insert(header::CONTENT_SECURITY_POLICY, value);
        }
        if let Ok(value) = HeaderValue::from_str(&nonce) {
            headers.insert("x-csp-nonce", value);
        }

        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(header::X_FRAME_OPTIONS, self.config.frame_options.to_header_value());
        headers.insert(header::X_XSS_PROTECTION, self.config.xss_protection.to_header_value());
        headers.insert(header::REFERRER_POLICY, self.config.referrer_policy.to_header_value());
        if let Ok(value) = HeaderValue::from_str(&self.config.permissions_policy) {
            headers.insert("permissions-policy", value);
        }

        headers.insert("x-permitted-cross-domain-policies", HeaderValue::from_static("none"));
        headers.insert("cross-origin-embedder-policy", HeaderValue::from_static("require-corp"));
        headers.insert("cross-origin-opener-policy", HeaderValue::from_static("same-origin"));
        headers.insert("cross-origin-resource-policy", HeaderValue::from_static("same-origin"));

        if is_https {
            if let Ok(value) = HeaderValue::from_str(&self.config.hsts_value()) {
                headers.insert(header::STRICT_TRANSPORT_SECURITY, value);
            }
        } else {
            headers.remove(header::STRICT_TRANSPORT_SECURITY);
        }
    }
}
