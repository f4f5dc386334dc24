//! Middleware modules for the edge request pipeline
//!
//! - Path filtering and static-asset bypass
//! - Cookie security validation
//! - Generic request validation and XSS detection
//! - Rate limiting and repeat-offender blocking
//! - Authentication & authorization
//! - Security headers
//! - Audit logging
//! - Request ID handling

pub mod auth;
pub mod cookie_security;
pub mod error;
pub mod logging;
pub mod offenders;
pub mod path_filter;
pub mod patterns;
pub mod pipeline;
pub mod rate_limit;
pub mod request_id;
pub mod security;
pub mod validation;
pub mod xss;

// Re-export commonly used types
pub use auth::{
    AuthorizationResolver, ClaimsDecoder, UntrustedClaimsDecoder, UserContext,
    VerifiedClaimsDecoder,
};
pub use error::AppError;
pub use logging::{AuditConfig, AuditLogger};
pub use offenders::OffenderTracker;
pub use pipeline::{EdgePipeline, PipelineError, PipelineStores, SecurityCheck, edge_middleware};
pub use rate_limit::{
    FixedWindowRateLimiter, RateLimitDecision, RateLimitStrategy, SlidingWindowRateLimiter,
    TokenBucketRateLimiter,
};
pub use request_id::GatewayRequestId;
pub use security::{ResponseComposer, SecurityHeadersConfig};
pub use validation::RequestValidator;
pub use xss::XssDetector;
