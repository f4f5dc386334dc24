use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use axum_extra::extract::cookie::CookieJar;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::debug;

use super::cookie_security::AUTH_COOKIE_NAMES;
use crate::domain::entities::{AuthClaims, AuthState, RequestContext, UnauthenticatedReason};
use crate::infrastructure::config::AuthConfig;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Token decoding errors
#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Token is not a three-part JWT")]
    InvalidFormat,

    #[error("Token payload is not valid base64url")]
    InvalidEncoding,

    #[error("Token payload is not a JSON object")]
    InvalidPayload,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Signature verification enabled without a secret")]
    MissingSecret,

    #[error("Token decoding error: {0}")]
    DecodingError(String),
}

/// Turns a raw session token into claims
pub trait ClaimsDecoder: Send + Sync {
    fn decode(&self, token: &str) -> Result<AuthClaims, ClaimsError>;
}

/// Reads the payload segment without checking the signature.
///
/// Anyone can mint a token this decoder accepts; the upstream must verify
/// sessions itself before trusting the forwarded user headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntrustedClaimsDecoder;

impl ClaimsDecoder for UntrustedClaimsDecoder {
    fn decode(&self, token: &str) -> Result<AuthClaims, ClaimsError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [_, payload, _] = segments.as_slice() else {
            return Err(ClaimsError::InvalidFormat);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| ClaimsError::InvalidEncoding)?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(AuthClaims::from_payload(&map)),
            _ => Err(ClaimsError::InvalidPayload),
        }
    }
}

/// HS256 signature verification with `jsonwebtoken`
#[derive(Clone)]
pub struct VerifiedClaimsDecoder {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl VerifiedClaimsDecoder {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        // Tokens without `exp` are accepted; session age is enforced from `iat`
        validation.required_spec_claims.clear();

        Self { decoding_key: DecodingKey::from_secret(secret.as_ref()), validation }
    }
}

impl ClaimsDecoder for VerifiedClaimsDecoder {
    fn decode(&self, token: &str) -> Result<AuthClaims, ClaimsError> {
        decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map(|data| AuthClaims::from_payload(&data.claims))
            .map_err(|e| {
                debug!("Failed to verify JWT: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => ClaimsError::Expired,
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        ClaimsError::InvalidSignature
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => ClaimsError::InvalidFormat,
                    _ => ClaimsError::DecodingError(e.to_string()),
                }
            })
    }
}

/// Identity forwarded to the upstream for an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub is_admin: bool,
}

impl UserContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Set `X-User-ID` and `X-User-Roles` (a JSON array)
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let user_id = self.user_id.as_deref().unwrap_or_default();
        if let Ok(value) = HeaderValue::from_str(user_id) {
            headers.insert(USER_ID_HEADER, value);
        }
        let roles = serde_json::to_string(&self.roles).unwrap_or_else(|_| "[]".to_string());
        if let Ok(value) = HeaderValue::from_str(&roles) {
            headers.insert(USER_ROLES_HEADER, value);
        }
    }
}

impl From<&AuthClaims> for UserContext {
    fn from(claims: &AuthClaims) -> Self {
        Self {
            user_id: claims.user_id.clone(),
            roles: claims.roles.clone(),
            permissions: claims.permissions.clone(),
            is_admin: claims.is_admin_user(),
        }
    }
}

impl fmt::Display for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UserContext(user_id={:?}, roles={:?}, is_admin={})",
            self.user_id, self.roles, self.is_admin
        )
    }
}

/// What the resolver decided for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Carries the user when the request was authenticated
    Allowed(Option<UserContext>),
    /// Browser request to a protected page without a session
    LoginRedirect { location: String, reason: UnauthenticatedReason },
    /// API request to a protected route without a session
    Unauthenticated(UnauthenticatedReason),
    /// Authenticated, but the route needs the admin role
    Forbidden(UserContext),
}

/// Determines authentication state and enforces per-route requirements
#[derive(Clone)]
pub struct AuthorizationResolver {
    decoder: Arc<dyn ClaimsDecoder>,
    max_session_age_secs: i64,
    login_path: String,
}

impl AuthorizationResolver {
    pub fn new(decoder: Arc<dyn ClaimsDecoder>, config: &AuthConfig) -> Self {
        Self {
            decoder,
            max_session_age_secs: config.max_session_age_secs as i64,
            login_path: config.login_path.clone(),
        }
    }

    /// Pick the decoder named by the configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self, ClaimsError> {
        let decoder: Arc<dyn ClaimsDecoder> = if config.verify_signatures {
            let secret = config
                .jwt_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or(ClaimsError::MissingSecret)?;
            Arc::new(VerifiedClaimsDecoder::new(secret))
        } else {
            Arc::new(UntrustedClaimsDecoder)
        };
        Ok(Self::new(decoder, config))
    }

    /// Session cookie first, then the bearer header
    pub fn extract_token(headers: &HeaderMap) -> Option<String> {
        let jar = CookieJar::from_headers(headers);
        let from_cookie = AUTH_COOKIE_NAMES
            .iter()
            .filter_map(|name| jar.get(name))
            .map(|cookie| cookie.value().to_string())
            .find(|value| !value.is_empty());

        from_cookie.or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
    }

    pub fn resolve(&self, headers: &HeaderMap) -> AuthState {
        self.resolve_at(headers, chrono::Utc::now().timestamp())
    }

    pub fn resolve_at(&self, headers: &HeaderMap, now: i64) -> AuthState {
        let Some(token) = Self::extract_token(headers) else {
            return AuthState::Unauthenticated(UnauthenticatedReason::NoToken);
        };

        let claims = match self.decoder.decode(&token) {
            Ok(claims) => claims,
            Err(ClaimsError::Expired) => {
                return AuthState::Unauthenticated(UnauthenticatedReason::Expired);
            }
            Err(e) => {
                debug!(error = %e, "Rejected session token");
                return AuthState::Unauthenticated(UnauthenticatedReason::Malformed);
            }
        };

        if claims.is_expired_at(now) {
            AuthState::Unauthenticated(UnauthenticatedReason::Expired)
        } else if claims.is_stale_at(now, self.max_session_age_secs) {
            AuthState::Unauthenticated(UnauthenticatedReason::Stale)
        } else {
            AuthState::Authenticated(claims)
        }
    }

    pub fn authorize(&self, ctx: &RequestContext) -> AuthorizationOutcome {
        self.authorize_state(ctx, self.resolve(&ctx.headers))
    }

    pub fn authorize_state(&self, ctx: &RequestContext, state: AuthState) -> AuthorizationOutcome {
        let user = state.claims().map(UserContext::from);

        match (state, user) {
            (AuthState::Unauthenticated(reason), _) if ctx.route.requires_auth() => {
                if ctx.accepts_html() {
                    AuthorizationOutcome::LoginRedirect {
                        location: self.login_redirect(&ctx.path),
                        reason,
                    }
                } else {
                    AuthorizationOutcome::Unauthenticated(reason)
                }
            }
            (_, Some(user)) if ctx.route.requires_admin() && !user.is_admin => {
                AuthorizationOutcome::Forbidden(user)
            }
            (_, user) => AuthorizationOutcome::Allowed(user),
        }
    }

    /// `/login?from=<path>&reason=authentication_required`
    pub fn login_redirect(&self, path: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("from", path)
            .append_pair("reason", "authentication_required")
            .finish();
        format!("{}?{query}", self.login_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method, Uri, header};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn unsigned_token(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    fn auth_config() -> AuthConfig {
        AuthConfig {
            login_path: "/login".to_string(),
            max_session_age_secs: 86_400,
            verify_signatures: false,
            jwt_secret: None,
        }
    }

    fn resolver() -> AuthorizationResolver {
        AuthorizationResolver::new(Arc::new(UntrustedClaimsDecoder), &auth_config())
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    fn context(path: &str, accept: &'static str, token: Option<&str>) -> RequestContext {
        let uri: Uri = path.parse().unwrap();
        let mut headers = token.map(bearer).unwrap_or_default();
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        RequestContext::new(Method::GET, &uri, headers, None, true)
    }

    #[test]
    fn test_untrusted_decoder_reads_payload() {
        let token = unsigned_token(&json!({"sub": "user-1", "roles": ["admin"]}));
        let claims = UntrustedClaimsDecoder.decode(&token).unwrap();
        assert_eq!(claims.user_id.as_deref(), Some("user-1"));
        assert!(claims.is_admin_user());
    }

    #[test]
    fn test_untrusted_decoder_rejects_garbage() {
        assert!(matches!(UntrustedClaimsDecoder.decode("abc"), Err(ClaimsError::InvalidFormat)));
        assert!(matches!(
            UntrustedClaimsDecoder.decode("a.!!!.c"),
            Err(ClaimsError::InvalidEncoding)
        ));
        let not_object = format!("a.{}.c", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(matches!(
            UntrustedClaimsDecoder.decode(&not_object),
            Err(ClaimsError::InvalidPayload)
        ));
    }

    #[test]
    fn test_verified_decoder() {
        let claims = json!({"sub": "user-2", "exp": chrono::Utc::now().timestamp() + 600});
        let key = EncodingKey::from_secret(b"right-secret");
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let decoded = VerifiedClaimsDecoder::new("right-secret").decode(&token).unwrap();
        assert_eq!(decoded.user_id.as_deref(), Some("user-2"));

        assert!(matches!(
            VerifiedClaimsDecoder::new("wrong-secret").decode(&token),
            Err(ClaimsError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verified_decoder_reports_expiry() {
        let claims = json!({"sub": "user-2", "exp": chrono::Utc::now().timestamp() - 600});
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"s")).unwrap();
        assert!(matches!(
            VerifiedClaimsDecoder::new("s").decode(&token),
            Err(ClaimsError::Expired)
        ));
    }

    #[test]
    fn test_from_config_requires_secret_for_verification() {
        let config = AuthConfig { verify_signatures: true, ..auth_config() };
        assert!(matches!(
            AuthorizationResolver::from_config(&config),
            Err(ClaimsError::MissingSecret)
        ));

        let config = AuthConfig { jwt_secret: Some("s3cret".to_string()), ..config };
        assert!(AuthorizationResolver::from_config(&config).is_ok());
    }

    #[test]
    fn test_cookie_takes_precedence_over_bearer() {
        let cookie_token = unsigned_token(&json!({"sub": "from-cookie"}));
        let mut headers = bearer(&unsigned_token(&json!({"sub": "from-header"})));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; auth_token={cookie_token}")).unwrap(),
        );

        assert_eq!(AuthorizationResolver::extract_token(&headers), Some(cookie_token));
    }

    #[test]
    fn test_state_machine() {
        let resolver = resolver();

        assert_eq!(
            resolver.resolve_at(&HeaderMap::new(), NOW),
            AuthState::Unauthenticated(UnauthenticatedReason::NoToken)
        );
        assert_eq!(
            resolver.resolve_at(&bearer("not-a-jwt"), NOW),
            AuthState::Unauthenticated(UnauthenticatedReason::Malformed)
        );

        let expired = unsigned_token(&json!({"sub": "u", "exp": NOW - 1}));
        assert_eq!(
            resolver.resolve_at(&bearer(&expired), NOW),
            AuthState::Unauthenticated(UnauthenticatedReason::Expired)
        );

        let stale = unsigned_token(&json!({"sub": "u", "iat": NOW - 86_401, "exp": NOW + 60}));
        assert_eq!(
            resolver.resolve_at(&bearer(&stale), NOW),
            AuthState::Unauthenticated(UnauthenticatedReason::Stale)
        );

        let ancient = unsigned_token(&json!({"sub": "u", "iat": -1e300, "exp": NOW + 60}));
        assert_eq!(
            resolver.resolve_at(&bearer(&ancient), NOW),
            AuthState::Unauthenticated(UnauthenticatedReason::Stale)
        );

        let fresh = unsigned_token(&json!({"sub": "u", "iat": NOW - 60, "exp": NOW + 60}));
        assert!(resolver.resolve_at(&bearer(&fresh), NOW).is_authenticated());
    }

    #[test]
    fn test_browser_is_redirected_to_login() {
        let ctx = context("/dashboard", "text/html,application/xhtml+xml", None);
        match resolver().authorize(&ctx) {
            AuthorizationOutcome::LoginRedirect { location, reason } => {
                assert_eq!(location, "/login?from=%2Fdashboard&reason=authentication_required");
                assert_eq!(reason, UnauthenticatedReason::NoToken);
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_api_client_gets_unauthenticated() {
        let ctx = context("/dashboard", "application/json", None);
        assert_eq!(
            resolver().authorize(&ctx),
            AuthorizationOutcome::Unauthenticated(UnauthenticatedReason::NoToken)
        );
    }

    #[test]
    fn test_non_admin_is_forbidden_on_admin_routes() {
        let token = unsigned_token(&json!({"sub": "u", "roles": ["editor"]}));
        let ctx = context("/admin/users", "application/json", Some(&token));
        assert!(matches!(resolver().authorize(&ctx), AuthorizationOutcome::Forbidden(_)));

        let token = unsigned_token(&json!({"sub": "root", "is_admin": true}));
        let ctx = context("/admin/users", "application/json", Some(&token));
        assert!(matches!(resolver().authorize(&ctx), AuthorizationOutcome::Allowed(Some(_))));
    }

    #[test]
    fn test_public_route_allows_anonymous() {
        let ctx = context("/login", "text/html", None);
        assert_eq!(resolver().authorize(&ctx), AuthorizationOutcome::Allowed(None));
    }

    #[test]
    fn test_user_headers() {
        let user = UserContext {
            user_id: Some("user-1".to_string()),
            roles: vec!["admin".to_string(), "editor".to_string()],
            permissions: vec![],
            is_admin: true,
        };
        let mut headers = HeaderMap::new();
        user.apply_headers(&mut headers);

        assert_eq!(headers[USER_ID_HEADER], "user-1");
        assert_eq!(headers[USER_ROLES_HEADER], r#"["admin","editor"]"#);
        assert!(user.has_role("editor"));
        assert!(!user.has_permission("reports:write"));
    }
}
