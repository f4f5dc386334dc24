use std::sync::Arc;

use crate::infrastructure::{config::AppConfig, upstream::UpstreamClient};

pub mod health;
pub mod proxy;

/// Shared state for the gateway's own handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Absent when no upstream is configured; allowed requests then get a JSON 404
    pub upstream: Option<Arc<UpstreamClient>>,
}
