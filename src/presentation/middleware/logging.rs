use axum::http::StatusCode;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::domain::entities::{RequestContext, RequestSummary, ViolationRecord};
use crate::infrastructure::config::{AppConfig, RuntimeMode};
use crate::infrastructure::monitoring::{MonitoringClient, MonitoringEvent};

const MAX_USER_AGENT_CHARS: usize = 100;

/// Audit logging configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub environment: RuntimeMode,
    /// Requests slower than this are summarized even when they succeed
    pub slow_request_threshold: Duration,
    pub max_user_agent_chars: usize,
}

impl AuditConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            environment: config.mode,
            slow_request_threshold: config.security.slow_request_threshold(),
            max_user_agent_chars: MAX_USER_AGENT_CHARS,
        }
    }
}

/// Emits request summaries and violation events, and forwards them to the
/// monitoring collector in production
#[derive(Debug, Clone)]
pub struct AuditLogger {
    config: AuditConfig,
    monitoring: Option<MonitoringClient>,
}

impl AuditLogger {
    pub fn new(config: AuditConfig, monitoring: Option<MonitoringClient>) -> Self {
        Self { config, monitoring }
    }

    fn forwards(&self) -> Option<&MonitoringClient> {
        self.monitoring.as_ref().filter(|_| self.config.environment.is_production())
    }

    pub fn summarize(
        &self,
        ctx: &RequestContext,
        status: StatusCode,
        duration: Duration,
    ) -> RequestSummary {
        RequestSummary {
            request_id: ctx.request_id.clone(),
            method: ctx.method.to_string(),
            path: ctx.path.clone(),
            status: status.as_u16(),
            duration_ms: duration.as_millis() as u64,
            user_agent: ctx.user_agent.chars().take(self.config.max_user_agent_chars).collect(),
            client_ip: ctx.client_ip.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Summarize a finished request. Returns the summary when it was worth emitting.
    pub fn log_request(
        &self,
        ctx: &RequestContext,
        status: StatusCode,
        duration: Duration,
    ) -> Option<RequestSummary> {
        let slow = duration > self.config.slow_request_threshold;

        if !status.is_client_error() && !status.is_server_error() && !slow {
            debug!(
                target: "http_requests",
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                status = status.as_u16(),
                duration_ms = duration.as_millis() as u64,
                "Request completed"
            );
            return None;
        }

        let summary = self.summarize(ctx, status, duration);
        let payload = serde_json::to_string(&summary).unwrap_or_default();

        if status.is_server_error() {
            error!(target: "http_requests", "{}", payload);
        } else if status.is_client_error() {
            warn!(target: "http_requests", "{}", payload);
        }

        if slow {
            warn!(
                target: "slow_requests",
                request_id = %summary.request_id,
                method = %summary.method,
                path = %summary.path,
                status = summary.status,
                duration_ms = summary.duration_ms,
                "Slow request detected"
            );
        }

        if let Some(monitoring) = self.forwards() {
            monitoring.forward(MonitoringEvent::RequestSummary(summary.clone()));
        }

        Some(summary)
    }

    pub fn log_violation(&self, request_id: &str, record: &ViolationRecord) {
        warn!(
            target: "security_events",
            request_id,
            violation = record.kind.as_str(),
            severity = record.severity.as_str(),
            environment = %record.environment,
            details = %record.details,
            "Security violation"
        );

        if let Some(monitoring) = self.forwards() {
            monitoring.forward(MonitoringEvent::SecurityViolation(record.clone()));
        }
    }
}
