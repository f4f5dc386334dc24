use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::domain::value_objects::Severity;
use crate::infrastructure::config::RuntimeMode;

/// Kind of policy violation that stopped a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CookieSecurity,
    RateLimitExceeded,
    SuspiciousRequest,
    XssAttempt,
    UnauthorizedAccess,
    InsufficientPermissions,
    RepeatOffender,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CookieSecurity => "cookie_security",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::SuspiciousRequest => "suspicious_request",
            Self::XssAttempt => "xss_attempt",
            Self::UnauthorizedAccess => "unauthorized_access",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::RepeatOffender => "repeat_offender",
        }
    }
}

/// A security event handed to the audit logger
#[derive(Debug, Clone, Serialize)]
pub struct ViolationRecord {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub severity: Severity,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
    pub environment: RuntimeMode,
}

impl ViolationRecord {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        details: Value,
        environment: RuntimeMode,
    ) -> Self {
        Self { kind, severity, details, timestamp: Utc::now(), environment }
    }
}

/// Summary of a finished request, emitted for failures and slow requests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub user_agent: String,
    pub client_ip: String,
    pub timestamp: DateTime<Utc>,
}
