use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::CookieJar;

use crate::infrastructure::config::{RuntimeMode, SecurityConfig};

/// Cookies that carry the session token, in lookup order
pub const AUTH_COOKIE_NAMES: &[&str] = &["auth_token", "access_token"];

const MAX_COOKIE_HEADER_BYTES: usize = 4096;
const MIN_AUTH_TOKEN_LENGTH: usize = 32;

/// Outcome of the cookie checks. Issues block the request, warnings are only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieValidation {
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl CookieValidation {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Transport and formatting checks on request cookies
#[derive(Debug, Clone)]
pub struct CookieSecurityValidator {
    require_https: bool,
}

impl CookieSecurityValidator {
    pub fn new(mode: RuntimeMode, security: &SecurityConfig) -> Self {
        let require_https = (mode.is_production() || security.force_secure_cookies)
            && !security.bypass_https_check;
        Self { require_https }
    }

    pub fn validate(&self, headers: &HeaderMap, is_https: bool) -> CookieValidation {
        let mut result = CookieValidation::default();
        let cookie_headers: Vec<&[u8]> =
            headers.get_all(header::COOKIE).iter().map(|value| value.as_bytes()).collect();

        if cookie_headers.is_empty() {
            return result;
        }

        if self.require_https && !is_https {
            result.issues.push("Cookies must be sent over HTTPS".to_string());
        }

        if cookie_headers.iter().any(|raw| contains_line_break(raw)) {
            result.issues.push("Cookie header contains line breaks".to_string());
        }

        let total_length: usize = cookie_headers.iter().map(|raw| raw.len()).sum();
        if total_length > MAX_COOKIE_HEADER_BYTES {
            result.warnings.push(format!(
                "Cookie header is {total_length} bytes, above {MAX_COOKIE_HEADER_BYTES}"
            ));
        }

        let jar = CookieJar::from_headers(headers);
        for name in AUTH_COOKIE_NAMES {
            let Some(cookie) = jar.get(name) else { continue };
            let value = cookie.value();
            if value.len() < MIN_AUTH_TOKEN_LENGTH {
                result.warnings.push(format!("{name} cookie is unusually short"));
            }
            if !value.chars().all(is_token_char) {
                result.issues.push(format!("{name} cookie contains invalid characters"));
            }
        }

        result
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '=')
}

fn contains_line_break(raw: &[u8]) -> bool {
    if raw.contains(&b'\r') || raw.contains(&b'\n') {
        return true;
    }
    let lowered = raw.to_ascii_lowercase();
    lowered.windows(3).any(|w| w == b"%0d" || w == b"%0a")
}
