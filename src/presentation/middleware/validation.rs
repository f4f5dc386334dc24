use axum::http::HeaderMap;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use super::patterns::{PatternFamily, PatternSet};
use crate::domain::entities::RequestContext;
use crate::domain::repositories::{KeyValueStore, StoreError, SweepSchedule};
use crate::domain::value_objects::{Severity, Verdict};
use crate::infrastructure::config::SecurityConfig;

/// Scanner and exploitation tool signatures found in user agents
pub const SUSPICIOUS_USER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "nessus",
    "openvas",
    "w3af",
    "acunetix",
    "burpsuite",
    "dirbuster",
    "gobuster",
    "wfuzz",
    "zgrab",
    "havij",
    "hydra",
];

const TIMING_TTL_SECS: i64 = 60;
const TIMING_SWEEP_INTERVAL_MS: i64 = 60_000;

/// Headers used to spoof the client address past rate limits
const BYPASS_HEADERS: &[&str] = &["x-originating-ip", "x-remote-ip", "x-remote-addr"];

static PATH_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(vec![
        PatternFamily::new(
            "path_traversal",
            Severity::High,
            &[r"\.\./", r"\.\.\\", r"%2e%2e(%2f|%5c|/|\\)", r"\.\.%2f", r"\.\.%5c", r"%00"],
        ),
        PatternFamily::new(
            "suspicious_extension",
            Severity::High,
            &[
                r"\.(php\d?|asp|aspx|jsp|cgi|pl|env|git|htaccess|htpasswd|ini|bak|sql|sh)(/|$)",
                r"/\.(git|env|svn|hg)(/|$)",
            ],
        ),
    ])
});

static QUERY_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(vec![
        PatternFamily::new(
            "xss",
            Severity::High,
            &[
                r"<\s*script",
                r"javascript\s*:",
                r"vbscript\s*:",
                r"\bon[a-z]+\s*=",
                r"<\s*(iframe|object|embed|svg|img|link|meta)\b",
                r"data:[^,]*base64",
            ],
        ),
        PatternFamily::new(
            "sql_injection",
            Severity::High,
            &[
                r"\bunion(\s+all)?\s+select\b",
                r"\bdrop\s+table\b",
                r"\bdelete\s+from\b",
                r"\binsert\s+into\b",
                r"\bupdate\s+\w+\s+set\b",
                r"\bexec(ute)?\s*\(",
                r"\b(sp|xp)_\w+",
                r"--\s*$",
                r"/\*.*\*/",
                r";\s*--",
                r"'\s*or\s+'?\d+'?\s*=\s*'?\d+",
                r"'\s*or\s+'[^']*'\s*=\s*'",
            ],
        ),
        PatternFamily::new(
            "command_injection",
            Severity::High,
            &[
                r"[;|]\s*(ls|cat|rm|wget|curl|bash|sh|nc|whoami|id|uname|ping)\b",
                r"&&\s*\w+",
                r"\$\([^)]*\)",
                r"`[^`]*`",
                r"\b(eval|system|shell_exec|passthru|popen|proc_open)\s*\(",
            ],
        ),
    ])
});

/// Limits applied by the generic request validator
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_path_length: usize,
    pub max_query_value_length: usize,
    pub max_body_size: u64,
    pub max_forwarded_hops: usize,
    /// Zero disables the rapid-fire check
    pub rapid_request_threshold: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_path_length: 2048,
            max_query_value_length: 2048,
            max_body_size: 10 * 1024 * 1024,
            max_forwarded_hops: 10,
            rapid_request_threshold: Duration::from_millis(100),
        }
    }
}

impl ValidationConfig {
    pub fn from_security(security: &SecurityConfig) -> Self {
        Self {
            max_body_size: security.max_body_bytes,
            rapid_request_threshold: security.rapid_request_threshold(),
            ..Self::default()
        }
    }
}

/// Reasons the generic validator blocks a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    SuspiciousUserAgent { agent: String },
    SuspiciousPath { family: &'static str },
    PathTooLong { length: usize, max_length: usize },
    QueryValueTooLong { parameter: String, length: usize, max_length: usize },
    SuspiciousQuery { parameter: String, family: &'static str },
    HeaderInjection { header: String },
    RateLimitBypassAttempt { header: String },
    BodyTooLarge { size: u64, max_size: u64 },
    InvalidJson { message: String },
    RapidFire { gap_ms: i64 },
}

impl ValidationError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::SuspiciousUserAgent { .. }
            | Self::SuspiciousPath { .. }
            | Self::SuspiciousQuery { .. }
            | Self::HeaderInjection { .. } => Severity::High,
            Self::PathTooLong { .. }
            | Self::QueryValueTooLong { .. }
            | Self::RateLimitBypassAttempt { .. }
            | Self::BodyTooLarge { .. }
            | Self::InvalidJson { .. }
            | Self::RapidFire { .. } => Severity::Medium,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::SuspiciousUserAgent { agent } => {
                write!(f, "Suspicious user agent detected: {agent}")
            }
            ValidationError::SuspiciousPath { family } => {
                write!(f, "Suspicious request path ({family})")
            }
            ValidationError::PathTooLong { length, max_length } => {
                write!(f, "Request path too long: {length} characters (max: {max_length})")
            }
            ValidationError::QueryValueTooLong { parameter, length, max_length } => {
                write!(
                    f,
                    "Query parameter '{parameter}' too long: {length} characters (max: {max_length})"
                )
            }
            ValidationError::SuspiciousQuery { parameter, family } => {
                write!(f, "Suspicious query parameter '{parameter}' ({family})")
            }
            ValidationError::HeaderInjection { header } => {
                write!(f, "Header injection attempt in '{header}'")
            }
            ValidationError::RateLimitBypassAttempt { header } => {
                write!(f, "Rate limit bypass attempt via '{header}'")
            }
            ValidationError::BodyTooLarge { size, max_size } => {
                write!(f, "Request body too large: {size} bytes (max: {max_size} bytes)")
            }
            ValidationError::InvalidJson { message } => write!(f, "Invalid JSON: {message}"),
            ValidationError::RapidFire { gap_ms } => {
                write!(f, "Rapid-fire requests detected ({gap_ms}ms apart)")
            }
        }
    }
}

/// Generic malicious-request validator. Checks run in a fixed order and the
/// first failure wins.
#[derive(Clone)]
pub struct RequestValidator {
    config: ValidationConfig,
    timing_store: Arc<dyn KeyValueStore<i64>>,
    timing_sweep: Arc<SweepSchedule>,
}

impl RequestValidator {
    pub fn new(config: ValidationConfig, timing_store: Arc<dyn KeyValueStore<i64>>) -> Self {
        Self {
            config,
            timing_store,
            timing_sweep: Arc::new(SweepSchedule::new(TIMING_SWEEP_INTERVAL_MS)),
        }
    }

    pub async fn validate(&self, ctx: &RequestContext) -> Result<Verdict, StoreError> {
        self.validate_at(ctx, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Verdict, StoreError> {
        let error = match self.validate_request(ctx) {
            Some(error) => Some(error),
            None => self.check_timing(&ctx.client_ip, now).await?,
        };

        Ok(error.map_or(Verdict::Allowed, |error| {
            debug!(request_id = %ctx.request_id, reason = %error, "Request failed validation");
            Verdict::deny(error.to_string(), error.severity())
        }))
    }

    /// Stateless checks, in order
    pub fn validate_request(&self, ctx: &RequestContext) -> Option<ValidationError> {
        Self::validate_user_agent(&ctx.user_agent)
            .or_else(|| self.validate_path(&ctx.path))
            .or_else(|| self.validate_query(&ctx.query_pairs()))
            .or_else(|| self.validate_headers(&ctx.headers))
            .or_else(|| self.validate_body(ctx))
    }

    fn validate_user_agent(user_agent: &str) -> Option<ValidationError> {
        let lowered = user_agent.to_lowercase();
        SUSPICIOUS_USER_AGENTS
            .iter()
            .find(|signature| lowered.contains(*signature))
            .map(|signature| ValidationError::SuspiciousUserAgent {
                agent: (*signature).to_string(),
            })
    }

    fn validate_path(&self, path: &str) -> Option<ValidationError> {
        if let Some(family) = PATH_PATTERNS.first_match(path) {
            return Some(ValidationError::SuspiciousPath { family: family.name });
        }
        if path.len() > self.config.max_path_length {
            return Some(ValidationError::PathTooLong {
                length: path.len(),
                max_length: self.config.max_path_length,
            });
        }
        None
    }

    fn validate_query(&self, pairs: &[(String, String)]) -> Option<ValidationError> {
        for (parameter, value) in pairs {
            if value.len() > self.config.max_query_value_length {
                return Some(ValidationError::QueryValueTooLong {
                    parameter: parameter.clone(),
                    length: value.len(),
                    max_length: self.config.max_query_value_length,
                });
            }
            if let Some(family) = QUERY_PATTERNS.first_match(value) {
                return Some(ValidationError::SuspiciousQuery {
                    parameter: parameter.clone(),
                    family: family.name,
                });
            }
        }
        None
    }

    fn validate_headers(&self, headers: &HeaderMap) -> Option<ValidationError> {
        for (name, value) in headers {
            if contains_line_break(value.as_bytes()) {
                return Some(ValidationError::HeaderInjection { header: name.to_string() });
            }
        }

        if let Some(header) = BYPASS_HEADERS.iter().find(|name| headers.contains_key(**name)) {
            return Some(ValidationError::RateLimitBypassAttempt { header: (*header).to_string() });
        }

        let hops = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .count();
        if hops > self.config.max_forwarded_hops {
            return Some(ValidationError::RateLimitBypassAttempt {
                header: "x-forwarded-for".to_string(),
            });
        }

        None
    }

    fn validate_body(&self, ctx: &RequestContext) -> Option<ValidationError> {
        let max_size = self.config.max_body_size;
        let size = ctx
            .body
            .as_ref()
            .map(|body| body.len() as u64)
            .max(ctx.declared_length())
            .unwrap_or_default();

        if ctx.body_over_limit || size > max_size {
            return Some(ValidationError::BodyTooLarge { size, max_size });
        }

        let is_json = ctx.content_type().is_some_and(|ct| ct.contains("application/json"));
        match ctx.body.as_ref() {
            Some(body) if is_json && !body.is_empty() => serde_json::from_slice::<Value>(body)
                .err()
                .map(|e| ValidationError::InvalidJson { message: e.to_string() }),
            _ => None,
        }
    }

    /// Flags a client whose previous request arrived less than the threshold ago
    async fn check_timing(
        &self,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ValidationError>, StoreError> {
        if self.config.rapid_request_threshold.is_zero() {
            return Ok(None);
        }

        let removed = self.timing_sweep.run_if_due(self.timing_store.as_ref(), now).await?;
        if removed > 0 {
            debug!(removed, "Swept expired request timings");
        }

        let key = format!("timing:{client}");
        let now_ms = now.timestamp_millis();
        let previous = self.timing_store.get(&key).await?;
        self.timing_store
            .set(&key, now_ms, now + ChronoDuration::seconds(TIMING_TTL_SECS))
            .await?;

        let threshold_ms = self.config.rapid_request_threshold.as_millis() as i64;
        Ok(previous
            .map(|last| now_ms - last)
            .filter(|gap| *gap < threshold_ms)
            .map(|gap_ms| ValidationError::RapidFire { gap_ms }))
    }
}

fn contains_line_break(raw: &[u8]) -> bool {
    if raw.contains(&b'\r') || raw.contains(&b'\n') {
        return true;
    }
    let lowered = raw.to_ascii_lowercase();
    lowered.windows(3).any(|w| w == b"%0d" || w == b"%0a")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryStore;
    use axum::http::{HeaderValue, Method, Uri, header};
    use bytes::Bytes;
    use rstest::rstest;

    fn validator(threshold_ms: u64) -> RequestValidator {
        RequestValidator::new(
            ValidationConfig {
                rapid_request_threshold: Duration::from_millis(threshold_ms),
                ..ValidationConfig::default()
            },
            Arc::new(InMemoryStore::new()),
        )
    }

    fn context(
        method: Method,
        uri: &str,
        headers: &[(&'static str, &'static str)],
    ) -> RequestContext {
        let uri: Uri = uri.parse().unwrap();
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        RequestContext::new(method, &uri, map, None, true)
    }

    #[tokio::test]
    async fn test_clean_request_is_allowed() {
        let ctx =
            context(Method::GET, "/dashboard?page=2&sort=name", &[("user-agent", "Mozilla/5.0")]);
        assert_eq!(validator(0).validate(&ctx).await.unwrap(), Verdict::Allowed);
    }

    #[tokio::test]
    async fn test_scanner_user_agent_is_denied() {
        let ctx = context(Method::GET, "/", &[("user-agent", "sqlmap/1.7.2#stable")]);
        let verdict = validator(0).validate(&ctx).await.unwrap();
        assert_eq!(verdict.severity(), Some(Severity::High));
    }

    #[rstest]
    #[case("/api/files/../../etc/passwd")]
    #[case("/api/v1/%2e%2e%2fsecret")]
    #[case("/.env")]
    #[case("/api/v1/shell.php")]
    fn test_suspicious_paths(#[case] uri: &str) {
        let ctx = context(Method::GET, uri, &[]);
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::SuspiciousPath { .. })
        ));
    }

    #[test]
    fn test_path_too_long() {
        let uri = format!("/{}", "a".repeat(2100));
        let uri: Uri = uri.parse().unwrap();
        let ctx = RequestContext::new(Method::GET, &uri, HeaderMap::new(), None, true);
        let error = validator(0).validate_request(&ctx).unwrap();
        assert_eq!(error.severity(), Severity::Medium);
    }

    #[rstest]
    #[case("/search?q=1%27%20OR%20%271%27%3D%271", "sql_injection")]
    #[case("/search?q=x%20UNION%20SELECT%20password%20FROM%20users", "sql_injection")]
    #[case("/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E", "xss")]
    #[case("/search?file=a.txt%3B%20cat%20%2Fetc%2Fpasswd", "command_injection")]
    fn test_injection_in_query(#[case] uri: &str, #[case] expected: &str) {
        let ctx = context(Method::GET, uri, &[]);
        match validator(0).validate_request(&ctx) {
            Some(ValidationError::SuspiciousQuery { family, .. }) => assert_eq!(family, expected),
            other => panic!("expected suspicious query, got {other:?}"),
        }
    }

    #[test]
    fn test_display_names_are_not_stored_procedures() {
        let ctx = context(Method::GET, "/users?display_name=Ada", &[]);
        assert_eq!(validator(0).validate_request(&ctx), None);
    }

    #[test]
    fn test_query_value_too_long() {
        let uri = format!("/search?q={}", "a".repeat(2049));
        let uri: Uri = uri.parse().unwrap();
        let ctx = RequestContext::new(Method::GET, &uri, HeaderMap::new(), None, true);
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::QueryValueTooLong { .. })
        ));
    }

    #[test]
    fn test_encoded_header_injection() {
        let ctx = context(Method::GET, "/", &[("x-custom", "value%0d%0aSet-Cookie: a=b")]);
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::HeaderInjection { .. })
        ));
    }

    #[test]
    fn test_rate_limit_bypass_headers() {
        let ctx = context(Method::GET, "/", &[("x-originating-ip", "127.0.0.1")]);
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::RateLimitBypassAttempt { .. })
        ));

        let chain = "1.1.1.1, 2.2.2.2, 3.3.3.3, 4.4.4.4, 5.5.5.5, 6.6.6.6, 7.7.7.7, 8.8.8.8, 9.9.9.9, 10.10.10.10, 11.11.11.11";
        let ctx = context(Method::GET, "/", &[("x-forwarded-for", chain)]);
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::RateLimitBypassAttempt { .. })
        ));
    }

    #[test]
    fn test_declared_body_too_large() {
        let ctx = context(Method::POST, "/api/v1/upload", &[("content-length", "20000000")]);
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::BodyTooLarge { .. })
        ));
    }

    #[test]
    fn test_body_over_buffer_limit() {
        let ctx = context(Method::POST, "/api/v1/upload", &[]).with_body_over_limit();
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::BodyTooLarge { .. })
        ));
    }

    #[test]
    fn test_malformed_json_body() {
        let mut ctx = context(Method::POST, "/api/v1/data", &[]);
        ctx.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let ctx = ctx.with_body(Bytes::from_static(b"{\"name\": "));
        assert!(matches!(
            validator(0).validate_request(&ctx),
            Some(ValidationError::InvalidJson { .. })
        ));

        let ctx = ctx.with_body(Bytes::from_static(b"{\"name\": \"ok\"}"));
        assert_eq!(validator(0).validate_request(&ctx), None);
    }

    #[tokio::test]
    async fn test_rapid_fire_detection() {
        let validator = validator(100);
        let ctx = context(Method::GET, "/dashboard", &[("x-forwarded-for", "203.0.113.9")]);
        let start = Utc::now();

        assert!(validator.validate_at(&ctx, start).await.unwrap().is_allowed());
        let verdict = validator
            .validate_at(&ctx, start + ChronoDuration::milliseconds(40))
            .await
            .unwrap();
        assert_eq!(verdict.severity(), Some(Severity::Medium));

        assert!(
            validator
                .validate_at(&ctx, start + ChronoDuration::milliseconds(500))
                .await
                .unwrap()
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn test_rapid_fire_tracks_clients_separately() {
        let validator = validator(100);
        let first = context(Method::GET, "/", &[("x-forwarded-for", "203.0.113.1")]);
        let second = context(Method::GET, "/", &[("x-forwarded-for", "203.0.113.2")]);
        let now = Utc::now();

        assert!(validator.validate_at(&first, now).await.unwrap().is_allowed());
        assert!(validator.validate_at(&second, now).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_timing_entries_are_evicted() {
        let store: Arc<InMemoryStore<i64>> = Arc::new(InMemoryStore::new());
        let config = ValidationConfig {
            rapid_request_threshold: Duration::from_millis(100),
            ..ValidationConfig::default()
        };
        let validator = RequestValidator::new(config, store.clone());
        let earlier = Utc::now() - ChronoDuration::minutes(10);

        for i in 0..2000u32 {
            let mut headers = HeaderMap::new();
            let client = format!("10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff);
            headers.insert("x-forwarded-for", HeaderValue::from_str(&client).unwrap());
            let ctx = RequestContext::new(Method::GET, &Uri::from_static("/"), headers, None, true);
            validator.validate_at(&ctx, earlier).await.unwrap();
        }
        assert_eq!(store.len().await, 2000);

        let ctx = context(Method::GET, "/", &[("x-forwarded-for", "203.0.113.50")]);
        validator.validate_at(&ctx, Utc::now()).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError::BodyTooLarge { size: 2048, max_size: 1024 };
        assert_eq!(error.to_string(), "Request body too large: 2048 bytes (max: 1024 bytes)");
    }
}
