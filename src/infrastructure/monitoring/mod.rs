use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::debug;

use crate::domain::entities::{RequestSummary, ViolationRecord};
use crate::infrastructure::config::MonitoringConfig;

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Monitoring endpoint rejected event with status {status}")]
    Rejected { status: u16 },
}

/// Payload posted to the external monitoring endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitoringEvent {
    SecurityViolation(ViolationRecord),
    RequestSummary(RequestSummary),
}

/// Client for the external security monitoring collector
#[derive(Debug, Clone)]
pub struct MonitoringClient {
    endpoint: String,
    http_client: HttpClient,
}

impl MonitoringClient {
    /// Build a client when an endpoint is configured
    pub fn from_config(config: &MonitoringConfig) -> Result<Option<Self>, MonitoringError> {
        let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(None);
        };

        let http_client = HttpClient::builder().timeout(config.timeout()).build()?;
        Ok(Some(Self { endpoint: endpoint.to_string(), http_client }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post an event and wait for the collector's answer
    pub async fn send(&self, event: &MonitoringEvent) -> Result<(), MonitoringError> {
        let response = self.http_client.post(&self.endpoint).json(event).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(MonitoringError::Rejected { status: response.status().as_u16() })
        }
    }

    /// Post an event in the background. Failures are logged and dropped.
    pub fn forward(&self, event: MonitoringEvent) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.send(&event).await {
                debug!(
                    endpoint = %client.endpoint,
                    error = %e,
                    "Failed to forward monitoring event"
                );
            }
        });
    }
}
