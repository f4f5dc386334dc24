//! Per-client counters of security violations.
//!
//! Every rejected request with a violation record is counted against its
//! client under one of three event classes. Once a class reaches its limit
//! inside its window, the client is turned away before any other check runs.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::rate_limit::RateLimitEntry;
use crate::domain::entities::{ViolationKind, ViolationRecord};
use crate::domain::repositories::{KeyValueStore, StoreError, SweepSchedule};

const SWEEP_INTERVAL_MS: i64 = 60_000;

/// Violation classes counted per client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffenderEvent {
    FailedLogin,
    MaliciousRequest,
    SuspiciousActivity,
}

impl OffenderEvent {
    pub const ALL: [Self; 3] =
        [Self::FailedLogin, Self::MaliciousRequest, Self::SuspiciousActivity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailedLogin => "failed_login",
            Self::MaliciousRequest => "malicious_request",
            Self::SuspiciousActivity => "suspicious_activity",
        }
    }

    /// Events tolerated inside one window
    pub fn limit(&self) -> u32 {
        match self {
            Self::FailedLogin => 5,
            Self::MaliciousRequest => 3,
            Self::SuspiciousActivity => 10,
        }
    }

    pub fn window(&self) -> TimeDelta {
        match self {
            Self::FailedLogin => TimeDelta::hours(1),
            Self::MaliciousRequest | Self::SuspiciousActivity => TimeDelta::hours(24),
        }
    }

    /// Requests that merely lacked a session are not held against the client
    pub fn from_violation(violation: &ViolationRecord) -> Option<Self> {
        match violation.kind {
            ViolationKind::CookieSecurity
            | ViolationKind::SuspiciousRequest
            | ViolationKind::XssAttempt => Some(Self::MaliciousRequest),
            ViolationKind::RateLimitExceeded | ViolationKind::InsufficientPermissions => {
                Some(Self::SuspiciousActivity)
            }
            ViolationKind::UnauthorizedAccess => {
                let reason = violation.details.get("reason").and_then(|reason| reason.as_str());
                (reason != Some("no_token")).then_some(Self::FailedLogin)
            }
            ViolationKind::RepeatOffender => None,
        }
    }
}

/// An active block for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffenderBlock {
    pub event: OffenderEvent,
    pub count: u32,
    pub until: DateTime<Utc>,
}

impl OffenderBlock {
    /// Whole seconds until the block lifts, never below one
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.until - now).num_milliseconds().max(0);
        ((millis + 999) / 1000).max(1) as u64
    }
}

/// Counts violations per `(client, event)` and reports blocked clients
pub struct OffenderTracker {
    store: Arc<dyn KeyValueStore<RateLimitEntry>>,
    sweep: SweepSchedule,
}

impl OffenderTracker {
    pub fn new(store: Arc<dyn KeyValueStore<RateLimitEntry>>) -> Self {
        Self { store, sweep: SweepSchedule::new(SWEEP_INTERVAL_MS) }
    }

    fn key(client: &str, event: OffenderEvent) -> String {
        format!("offender:{client}:{}", event.as_str())
    }

    /// Count a violation against `client`. Returns the event class it was
    /// counted under, if any.
    pub async fn record(
        &self,
        client: &str,
        violation: &ViolationRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<OffenderEvent>, StoreError> {
        let Some(event) = OffenderEvent::from_violation(violation) else {
            return Ok(None);
        };

        let removed = self.sweep.run_if_due(self.store.as_ref(), now).await?;
        if removed > 0 {
            debug!(removed, "Swept expired offender counters");
        }

        let key = Self::key(client, event);
        let entry = match self.store.get(&key).await? {
            Some(entry) if entry.reset_time > now => {
                RateLimitEntry { count: entry.count.saturating_add(1), ..entry }
            }
            _ => RateLimitEntry { count: 1, reset_time: now + event.window() },
        };
        self.store.set(&key, entry, entry.reset_time).await?;

        if entry.count == event.limit() {
            warn!(
                target: "security_events",
                client_ip = client,
                event = event.as_str(),
                count = entry.count,
                until = %entry.reset_time,
                "Client blocked after repeated violations"
            );
        }
        Ok(Some(event))
    }

    /// The first event class whose limit the client has reached
    pub async fn blocked(
        &self,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OffenderBlock>, StoreError> {
        for event in OffenderEvent::ALL {
            let entry = self.store.get(&Self::key(client, event)).await?;
            if let Some(entry) =
                entry.filter(|entry| entry.reset_time > now && entry.count >= event.limit())
            {
                return Ok(Some(OffenderBlock {
                    event,
                    count: entry.count,
                    until: entry.reset_time,
                }));
            }
        }
        Ok(None)
    }
}
