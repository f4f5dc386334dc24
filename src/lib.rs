#![deny(clippy::all)]
#![deny(clippy::pedantic)]
// Allow some overly strict pedantic lints for middleware code
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]

//! Edge Gateway
//!
//! The request-processing security pipeline that sits in front of the admin
//! dashboard: static-asset bypass, cookie security, attack pattern scanning,
//! rate limiting, session authorization, security headers and audit logging,
//! followed by a reverse proxy to the dashboard frontend.

pub mod domain;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types
pub use domain::entities::*;
pub use domain::value_objects::*;
