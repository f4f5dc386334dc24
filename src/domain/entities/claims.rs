use serde::Serialize;
use serde_json::{Map, Value};

/// Claims read from a session token payload.
///
/// Several field spellings are accepted because tokens come from more than one
/// issuer; the first present spelling wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthClaims {
    pub user_id: Option<String>,
    pub roles: Vec<String>,
    pub is_admin: bool,
    pub permissions: Vec<String>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

const USER_ID_FIELDS: &[&str] = &["sub", "user_id", "userId", "id"];
const ROLE_FIELDS: &[&str] = &["roles", "role"];
const ADMIN_FIELDS: &[&str] = &["is_admin", "isAdmin", "is_superuser"];
const PERMISSION_FIELDS: &[&str] = &["permissions", "scopes", "scope"];

impl AuthClaims {
    /// Extract claims from a decoded payload object
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            user_id: first_field(payload, USER_ID_FIELDS).and_then(value_as_string),
            roles: first_field(payload, ROLE_FIELDS).map(string_list).unwrap_or_default(),
            is_admin: first_field(payload, ADMIN_FIELDS).is_some_and(truthy),
            permissions: first_field(payload, PERMISSION_FIELDS)
                .map(string_list)
                .unwrap_or_default(),
            issued_at: payload.get("iat").and_then(value_as_timestamp),
            expires_at: payload.get("exp").and_then(value_as_timestamp),
        }
    }

    /// Admin flag set or `admin` present in the roles
    #[must_use]
    pub fn is_admin_user(&self) -> bool {
        self.is_admin || self.roles.iter().any(|role| role == "admin")
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// Issued longer ago than the allowed session age. An `iat` too far in
    /// the past to subtract counts as stale.
    #[must_use]
    pub fn is_stale_at(&self, now: i64, max_age_secs: i64) -> bool {
        self.issued_at
            .is_some_and(|iat| now.checked_sub(iat).is_none_or(|age| age > max_age_secs))
    }
}

/// Why a request is not authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    NoToken,
    Malformed,
    Expired,
    Stale,
}

impl UnauthenticatedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::Malformed => "malformed_token",
            Self::Expired => "token_expired",
            Self::Stale => "session_too_old",
        }
    }
}

/// Authentication state of a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Authenticated(AuthClaims),
    Unauthenticated(UnauthenticatedReason),
}

impl AuthState {
    #[must_use]
    pub fn claims(&self) -> Option<&AuthClaims> {
        match self {
            Self::Authenticated(claims) => Some(claims),
            Self::Unauthenticated(_) => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

fn first_field<'a>(payload: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().filter_map(|name| payload.get(*name)).find(|value| !value.is_null())
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Roles and scopes show up as arrays, single strings, or space-separated strings
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_string).collect(),
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}

fn value_as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
