//! Ordered security checks run on every request that reaches the gateway.
//!
//! The pipeline filters the path, builds a [`RequestContext`], runs each
//! [`SecurityCheck`] in turn until one rejects, then forwards or renders the
//! rejection. Every response except a static-asset pass-through goes through
//! the [`ResponseComposer`] and the [`AuditLogger`].

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::auth::{
    AuthorizationOutcome, AuthorizationResolver, ClaimsError, USER_ID_HEADER, USER_ROLES_HEADER,
    UserContext,
};
use super::cookie_security::CookieSecurityValidator;
use super::error::AppError;
use super::logging::{AuditConfig, AuditLogger};
use super::offenders::OffenderTracker;
use super::path_filter::{PathDecision, classify_path};
use super::rate_limit::{FixedWindowRateLimiter, RateLimitEntry, RateLimitRules, RateLimitStrategy};
use super::security::{ResponseComposer, SecurityHeadersConfig};
use super::validation::{RequestValidator, ValidationConfig};
use super::xss::XssDetector;
use crate::domain::entities::{RequestContext, ViolationKind, ViolationRecord, method_carries_body};
use crate::domain::repositories::{KeyValueStore, StoreError};
use crate::domain::value_objects::{Severity, Verdict};
use crate::infrastructure::config::{AppConfig, RuntimeMode};
use crate::infrastructure::monitoring::{MonitoringClient, MonitoringError};
use crate::infrastructure::persistence::InMemoryStore;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid auth configuration: {0}")]
    Auth(#[from] ClaimsError),

    #[error("Failed to build monitoring client: {0}")]
    Monitoring(#[from] MonitoringError),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Internal { message: err.to_string() }
    }
}

/// A terminal response and the violation that caused it, if any
#[derive(Debug)]
pub struct Rejection {
    pub error: AppError,
    pub violation: Option<ViolationRecord>,
}

#[derive(Debug)]
pub enum CheckOutcome {
    Continue,
    Reject(Rejection),
}

impl CheckOutcome {
    fn reject(error: AppError, violation: ViolationRecord) -> Self {
        Self::Reject(Rejection { error, violation: Some(violation) })
    }
}

/// State carried between checks for one request
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Set once the request is authenticated
    pub user: Option<UserContext>,
    /// Added to the forwarded response
    pub response_headers: HeaderMap,
}

/// One step of the pipeline
#[async_trait]
pub trait SecurityCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _ctx: &RequestContext) -> bool {
        true
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError>;
}

fn is_preflight(ctx: &RequestContext) -> bool {
    ctx.method == Method::OPTIONS
}

/// Turns away clients that already reached a violation limit
pub struct RepeatOffenderCheck {
    tracker: Arc<OffenderTracker>,
    enabled: bool,
    environment: RuntimeMode,
}

impl RepeatOffenderCheck {
    pub fn new(tracker: Arc<OffenderTracker>, enabled: bool, environment: RuntimeMode) -> Self {
        Self { tracker, enabled, environment }
    }
}

#[async_trait]
impl SecurityCheck for RepeatOffenderCheck {
    fn name(&self) -> &'static str {
        "repeat_offender"
    }

    fn applies_to(&self, ctx: &RequestContext) -> bool {
        self.enabled && !is_preflight(ctx)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        _state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError> {
        let now = Utc::now();
        let Some(block) = self.tracker.blocked(&ctx.client_ip, now).await? else {
            return Ok(CheckOutcome::Continue);
        };

        let retry_after = block.retry_after(now);
        let violation = ViolationRecord::new(
            ViolationKind::RepeatOffender,
            Severity::High,
            json!({
                "event": block.event.as_str(),
                "count": block.count,
                "path": ctx.path,
                "clientIp": ctx.client_ip,
                "retryAfter": retry_after,
            }),
            self.environment,
        );
        let error = AppError::ClientBlocked { event: block.event.as_str(), retry_after };
        Ok(CheckOutcome::reject(error, violation))
    }
}

pub struct CookieSecurityCheck {
    validator: CookieSecurityValidator,
    environment: RuntimeMode,
}

impl CookieSecurityCheck {
    pub fn new(validator: CookieSecurityValidator, environment: RuntimeMode) -> Self {
        Self { validator, environment }
    }
}

#[async_trait]
impl SecurityCheck for CookieSecurityCheck {
    fn name(&self) -> &'static str {
        "cookie_security"
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        _state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError> {
        let result = self.validator.validate(&ctx.headers, ctx.is_https);

        if !result.warnings.is_empty() {
            warn!(
                target: "security_events",
                request_id = %ctx.request_id,
                warnings = ?result.warnings,
                "Cookie security warnings"
            );
        }
        if result.is_valid() {
            return Ok(CheckOutcome::Continue);
        }

        let violation = ViolationRecord::new(
            ViolationKind::CookieSecurity,
            Severity::High,
            json!({
                "issues": result.issues,
                "warnings": result.warnings,
                "path": ctx.path,
                "clientIp": ctx.client_ip,
            }),
            self.environment,
        );
        Ok(CheckOutcome::reject(AppError::CookieSecurity { issues: result.issues }, violation))
    }
}

pub struct RequestValidationCheck {
    validator: RequestValidator,
    enabled: bool,
    environment: RuntimeMode,
}

impl RequestValidationCheck {
    pub fn new(validator: RequestValidator, enabled: bool, environment: RuntimeMode) -> Self {
        Self { validator, enabled, environment }
    }
}

#[async_trait]
impl SecurityCheck for RequestValidationCheck {
    fn name(&self) -> &'static str {
        "request_validation"
    }

    fn applies_to(&self, ctx: &RequestContext) -> bool {
        self.enabled && !is_preflight(ctx)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        _state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError> {
        match self.validator.validate(ctx).await? {
            Verdict::Allowed => Ok(CheckOutcome::Continue),
            Verdict::Denied { reason, severity } => {
                let violation = ViolationRecord::new(
                    ViolationKind::SuspiciousRequest,
                    severity,
                    json!({
                        "reason": reason,
                        "path": ctx.path,
                        "method": ctx.method.as_str(),
                        "clientIp": ctx.client_ip,
                        "userAgent": ctx.user_agent,
                    }),
                    self.environment,
                );
                Ok(CheckOutcome::reject(AppError::SecurityViolation { message: reason }, violation))
            }
        }
    }
}

pub struct XssCheck {
    detector: XssDetector,
    enabled: bool,
    environment: RuntimeMode,
}

impl XssCheck {
    pub fn new(detector: XssDetector, enabled: bool, environment: RuntimeMode) -> Self {
        Self { detector, enabled, environment }
    }
}

#[async_trait]
impl SecurityCheck for XssCheck {
    fn name(&self) -> &'static str {
        "xss"
    }

    fn applies_to(&self, ctx: &RequestContext) -> bool {
        self.enabled && !is_preflight(ctx)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        _state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError> {
        let report = self.detector.scan(ctx);
        if !report.detected {
            return Ok(CheckOutcome::Continue);
        }

        let severity = report.severity.unwrap_or(Severity::Medium);
        let violation = ViolationRecord::new(
            ViolationKind::XssAttempt,
            severity,
            json!({
                "families": report.families,
                "locations": report.locations,
                "path": ctx.path,
                "clientIp": ctx.client_ip,
            }),
            self.environment,
        );
        let error = AppError::XssDetected { message: "Potential XSS attack detected".to_string() };
        Ok(CheckOutcome::reject(error, violation))
    }
}

pub struct RateLimitCheck {
    limiter: Arc<dyn RateLimitStrategy>,
    enabled: bool,
    environment: RuntimeMode,
}

impl RateLimitCheck {
    pub fn new(
        limiter: Arc<dyn RateLimitStrategy>,
        enabled: bool,
        environment: RuntimeMode,
    ) -> Self {
        Self { limiter, enabled, environment }
    }
}

#[async_trait]
impl SecurityCheck for RateLimitCheck {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn applies_to(&self, ctx: &RequestContext) -> bool {
        self.enabled && ctx.route.rate_limited && !is_preflight(ctx)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError> {
        let decision = self.limiter.check(&ctx.client_ip, &ctx.path).await?;
        if decision.allowed {
            decision.add_headers(&mut state.response_headers);
            return Ok(CheckOutcome::Continue);
        }

        let violation = ViolationRecord::new(
            ViolationKind::RateLimitExceeded,
            Severity::Medium,
            json!({
                "path": ctx.path,
                "clientIp": ctx.client_ip,
                "limit": decision.limit,
                "retryAfter": decision.retry_after,
            }),
            self.environment,
        );
        Ok(CheckOutcome::reject(AppError::RateLimited { decision }, violation))
    }
}

pub struct AuthorizationCheck {
    resolver: AuthorizationResolver,
    environment: RuntimeMode,
}

impl AuthorizationCheck {
    pub fn new(resolver: AuthorizationResolver, environment: RuntimeMode) -> Self {
        Self { resolver, environment }
    }

    fn unauthenticated(&self, ctx: &RequestContext, reason: &str) -> ViolationRecord {
        ViolationRecord::new(
            ViolationKind::UnauthorizedAccess,
            Severity::Low,
            json!({
                "reason": reason,
                "path": ctx.path,
                "clientIp": ctx.client_ip,
            }),
            self.environment,
        )
    }
}

#[async_trait]
impl SecurityCheck for AuthorizationCheck {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn applies_to(&self, ctx: &RequestContext) -> bool {
        !is_preflight(ctx)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
    ) -> Result<CheckOutcome, PipelineError> {
        let outcome = match self.resolver.authorize(ctx) {
            AuthorizationOutcome::Allowed(user) => {
                state.user = user;
                CheckOutcome::Continue
            }
            AuthorizationOutcome::LoginRedirect { location, reason } => CheckOutcome::reject(
                AppError::LoginRedirect { location },
                self.unauthenticated(ctx, reason.as_str()),
            ),
            AuthorizationOutcome::Unauthenticated(reason) => CheckOutcome::reject(
                AppError::AuthenticationRequired { message: reason.as_str().to_string() },
                self.unauthenticated(ctx, reason.as_str()),
            ),
            AuthorizationOutcome::Forbidden(user) => {
                let violation = ViolationRecord::new(
                    ViolationKind::InsufficientPermissions,
                    Severity::Medium,
                    json!({
                        "reason": "admin_required",
                        "path": ctx.path,
                        "clientIp": ctx.client_ip,
                        "userId": user.user_id,
                        "roles": user.roles,
                    }),
                    self.environment,
                );
                let message = format!("Admin role required for {}", ctx.path);
                CheckOutcome::reject(AppError::InsufficientPermissions { message }, violation)
            }
        };
        Ok(outcome)
    }
}

/// Backing stores for the stateful checks
#[derive(Clone)]
pub struct PipelineStores {
    pub rate_limits: Arc<dyn KeyValueStore<RateLimitEntry>>,
    pub timings: Arc<dyn KeyValueStore<i64>>,
    pub offenders: Arc<dyn KeyValueStore<RateLimitEntry>>,
}

impl PipelineStores {
    pub fn in_memory() -> Self {
        Self {
            rate_limits: Arc::new(InMemoryStore::<RateLimitEntry>::new()),
            timings: Arc::new(InMemoryStore::<i64>::new()),
            offenders: Arc::new(InMemoryStore::<RateLimitEntry>::new()),
        }
    }
}

/// The edge request-processing pipeline
pub struct EdgePipeline {
    mode: RuntimeMode,
    trust_forwarded_proto: bool,
    inspect_bodies: bool,
    max_body_bytes: usize,
    checks: Vec<Box<dyn SecurityCheck>>,
    offenders: Arc<OffenderTracker>,
    composer: ResponseComposer,
    audit: AuditLogger,
}

impl EdgePipeline {
    /// In-memory stores and a monitoring client built from the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let monitoring = MonitoringClient::from_config(&config.monitoring)?;
        Self::new(config, PipelineStores::in_memory(), monitoring)
    }

    pub fn new(
        config: &AppConfig,
        stores: PipelineStores,
        monitoring: Option<MonitoringClient>,
    ) -> Result<Self, PipelineError> {
        let mode = config.mode;
        let security = &config.security;
        let scanning = !security.disable_security_monitoring;

        let limiter: Arc<dyn RateLimitStrategy> =
            Arc::new(FixedWindowRateLimiter::new(RateLimitRules::default(), stores.rate_limits));
        let validator =
            RequestValidator::new(ValidationConfig::from_security(security), stores.timings);

        let offenders = Arc::new(OffenderTracker::new(stores.offenders));

        let checks: Vec<Box<dyn SecurityCheck>> = vec![
            Box::new(RepeatOffenderCheck::new(
                Arc::clone(&offenders),
                security.block_repeat_offenders,
                mode,
            )),
            Box::new(CookieSecurityCheck::new(CookieSecurityValidator::new(mode, security), mode)),
            Box::new(RequestValidationCheck::new(validator, scanning, mode)),
            Box::new(XssCheck::new(
                XssDetector::new(),
                scanning && !security.bypass_xss_detection,
                mode,
            )),
            Box::new(RateLimitCheck::new(limiter, !security.bypass_rate_limit, mode)),
            Box::new(AuthorizationCheck::new(
                AuthorizationResolver::from_config(&config.auth)?,
                mode,
            )),
        ];

        Ok(Self {
            mode,
            trust_forwarded_proto: security.trust_forwarded_proto,
            inspect_bodies: scanning,
            max_body_bytes: usize::try_from(security.max_body_bytes).unwrap_or(usize::MAX),
            checks,
            offenders,
            composer: ResponseComposer::new(SecurityHeadersConfig::for_mode(mode)),
            audit: AuditLogger::new(AuditConfig::from_app(config), monitoring),
        })
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Run the checks in order and stop at the first rejection
    pub async fn evaluate(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
    ) -> Result<Option<Rejection>, PipelineError> {
        for check in &self.checks {
            if !check.applies_to(ctx) {
                continue;
            }
            if let CheckOutcome::Reject(rejection) = check.evaluate(ctx, state).await? {
                debug!(
                    request_id = %ctx.request_id,
                    check = check.name(),
                    status = rejection.error.status_code().as_u16(),
                    "Request rejected"
                );
                return Ok(Some(rejection));
            }
        }
        Ok(None)
    }

    pub async fn handle(&self, request: Request, next: Next) -> Response {
        let decision = classify_path(request.uri().path(), self.mode);
        if decision == PathDecision::Skip {
            return next.run(request).await;
        }

        let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
        let (mut parts, body) = request.into_parts();
        let mut ctx = RequestContext::new(
            parts.method.clone(),
            &parts.uri,
            parts.headers.clone(),
            peer,
            self.trust_forwarded_proto,
        );

        if decision == PathDecision::BlockNotFound {
            let response = AppError::DevRouteDisabled.into_response_for(&ctx.request_id);
            return self.finish(&ctx, response, None);
        }

        let body = if self.inspect_bodies && method_carries_body(&ctx.method) {
            match to_bytes(body, self.max_body_bytes).await {
                Ok(bytes) => {
                    ctx = ctx.with_body(bytes.clone());
                    Body::from(bytes)
                }
                Err(e) => {
                    debug!(request_id = %ctx.request_id, error = %e, "Request body not buffered");
                    ctx = ctx.with_body_over_limit();
                    Body::empty()
                }
            }
        } else {
            body
        };

        let mut state = PipelineState::default();
        let response = match self.evaluate(&ctx, &mut state).await {
            Ok(None) => {
                parts.headers.remove(USER_ID_HEADER);
                parts.headers.remove(USER_ROLES_HEADER);
                if let Some(user) = &state.user {
                    user.apply_headers(&mut parts.headers);
                }

                let mut response = next.run(Request::from_parts(parts, body)).await;
                response.headers_mut().extend(std::mem::take(&mut state.response_headers));
                response
            }
            Ok(Some(rejection)) => {
                if let Some(violation) = &rejection.violation {
                    self.audit.log_violation(&ctx.request_id, violation);
                    self.record_offence(&ctx, violation).await;
                }
                rejection.error.into_response_for(&ctx.request_id)
            }
            Err(e) => {
                error!(request_id = %ctx.request_id, error = %e, "Security pipeline failed");
                AppError::from(e).into_response_for(&ctx.request_id)
            }
        };

        self.finish(&ctx, response, state.user.as_ref())
    }

    /// A store failure here only loses the count; the rejection stands
    async fn record_offence(&self, ctx: &RequestContext, violation: &ViolationRecord) {
        if let Err(e) = self.offenders.record(&ctx.client_ip, violation, Utc::now()).await {
            warn!(request_id = %ctx.request_id, error = %e, "Failed to record violation");
        }
    }

    fn finish(
        &self,
        ctx: &RequestContext,
        response: Response,
        user: Option<&UserContext>,
    ) -> Response {
        let response = self.composer.compose(ctx, response, user);
        self.audit.log_request(ctx, response.status(), ctx.elapsed());
        response
    }
}

/// Axum middleware entry point
pub async fn edge_middleware(
    State(pipeline): State<Arc<EdgePipeline>>,
    request: Request,
    next: Next,
) -> Response {
    pipeline.handle(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Uri, header};

    fn config() -> AppConfig {
        let mut config = AppConfig::defaults_for(RuntimeMode::Development);
        config.security.rapid_request_threshold_ms = 0;
        config
    }

    fn pipeline(config: &AppConfig) -> EdgePipeline {
        EdgePipeline::new(config, PipelineStores::in_memory(), None).unwrap()
    }

    fn context(method: Method, uri: &str) -> RequestContext {
        let uri: Uri = uri.parse().unwrap();
        RequestContext::new(method, &uri, HeaderMap::new(), None, true)
    }

    async fn first_rejection(pipeline: &EdgePipeline, ctx: &RequestContext) -> Option<Rejection> {
        pipeline.evaluate(ctx, &mut PipelineState::default()).await.unwrap()
    }

    #[test]
    fn test_check_order() {
        assert_eq!(
            pipeline(&config()).check_names(),
            vec![
                "repeat_offender",
                "cookie_security",
                "request_validation",
                "xss",
                "rate_limit",
                "authorization",
            ]
        );
    }

    #[test]
    fn test_verification_without_secret_fails_construction() {
        let mut config = config();
        config.auth.verify_signatures = true;
        assert!(matches!(
            EdgePipeline::new(&config, PipelineStores::in_memory(), None),
            Err(PipelineError::Auth(ClaimsError::MissingSecret))
        ));
    }

    #[tokio::test]
    async fn test_public_request_passes() {
        let pipeline = pipeline(&config());
        assert!(first_rejection(&pipeline, &context(Method::GET, "/about")).await.is_none());
    }

    #[tokio::test]
    async fn test_validator_runs_before_xss_detector() {
        let pipeline = pipeline(&config());
        let ctx = context(Method::GET, "/about?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E");

        let rejection = first_rejection(&pipeline, &ctx).await.unwrap();
        assert!(matches!(rejection.error, AppError::SecurityViolation { .. }));
        assert_eq!(rejection.violation.unwrap().kind, ViolationKind::SuspiciousRequest);
    }

    #[tokio::test]
    async fn test_xss_in_referer() {
        let pipeline = pipeline(&config());
        let mut ctx = context(Method::GET, "/about");
        ctx.headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://evil.test/<script>alert(1)</script>"),
        );

        let rejection = first_rejection(&pipeline, &ctx).await.unwrap();
        assert!(matches!(rejection.error, AppError::XssDetected { .. }));
        assert_eq!(rejection.violation.unwrap().severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_monitoring_toggle_disables_scanners() {
        let mut config = config();
        config.security.disable_security_monitoring = true;
        let pipeline = pipeline(&config);

        let mut ctx = context(Method::GET, "/about");
        ctx.headers.insert(header::REFERER, HeaderValue::from_static("<script>x</script>"));
        assert!(first_rejection(&pipeline, &ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_xss_bypass_keeps_validator() {
        let mut config = config();
        config.security.bypass_xss_detection = true;
        let pipeline = pipeline(&config);

        let mut ctx = context(Method::GET, "/about");
        ctx.headers.insert(header::REFERER, HeaderValue::from_static("<script>x</script>"));
        assert!(first_rejection(&pipeline, &ctx).await.is_none());

        let ctx = context(Method::GET, "/about?id=1%20UNION%20SELECT%20password%20FROM%20users");
        assert!(first_rejection(&pipeline, &ctx).await.is_some());
    }

    #[tokio::test]
    async fn test_rate_limit_headers_recorded_on_success() {
        let pipeline = pipeline(&config());
        let mut state = PipelineState::default();
        let ctx = context(Method::GET, "/login");

        assert!(pipeline.evaluate(&ctx, &mut state).await.unwrap().is_none());
        assert_eq!(state.response_headers["x-ratelimit-limit"], "5");
        assert_eq!(state.response_headers["x-ratelimit-remaining"], "4");
    }

    #[tokio::test]
    async fn test_rate_limit_bypass() {
        let mut config = config();
        config.security.bypass_rate_limit = true;
        let pipeline = pipeline(&config);

        for _ in 0..10 {
            assert!(first_rejection(&pipeline, &context(Method::GET, "/login")).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_preflight_skips_rate_limit_and_auth() {
        let pipeline = pipeline(&config());
        for _ in 0..10 {
            let ctx = context(Method::OPTIONS, "/login");
            assert!(first_rejection(&pipeline, &ctx).await.is_none());
        }
        let preflight = context(Method::OPTIONS, "/dashboard");
        assert!(first_rejection(&pipeline, &preflight).await.is_none());
    }

    #[tokio::test]
    async fn test_repeat_offender_is_blocked_before_other_checks() {
        let pipeline = pipeline(&config());
        let ctx = context(Method::GET, "/about?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E");

        for _ in 0..3 {
            let rejection = first_rejection(&pipeline, &ctx).await.unwrap();
            let violation = rejection.violation.unwrap();
            pipeline.record_offence(&ctx, &violation).await;
        }

        let clean = context(Method::GET, "/about");
        let rejection = first_rejection(&pipeline, &clean).await.unwrap();
        assert!(matches!(rejection.error, AppError::ClientBlocked { .. }));
        assert_eq!(rejection.violation.unwrap().kind, ViolationKind::RepeatOffender);

        // Preflight is never blocked
        assert!(first_rejection(&pipeline, &context(Method::OPTIONS, "/about")).await.is_none());
    }

    #[tokio::test]
    async fn test_repeat_offender_toggle() {
        let mut config = config();
        config.security.block_repeat_offenders = false;
        let pipeline = pipeline(&config);
        let ctx = context(Method::GET, "/about?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E");

        for _ in 0..5 {
            let rejection = first_rejection(&pipeline, &ctx).await.unwrap();
            pipeline.record_offence(&ctx, &rejection.violation.unwrap()).await;
        }
        assert!(first_rejection(&pipeline, &context(Method::GET, "/about")).await.is_none());
    }

    #[tokio::test]
    async fn test_protected_route_requires_auth() {
        let pipeline = pipeline(&config());
        let rejection =
            first_rejection(&pipeline, &context(Method::GET, "/api/v1/users")).await.unwrap();
        assert!(matches!(rejection.error, AppError::AuthenticationRequired { .. }));
        assert_eq!(rejection.violation.unwrap().kind, ViolationKind::UnauthorizedAccess);
    }
}
