use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::domain::{
    repositories::{KeyValueStore, StoreError, SweepSchedule},
    value_objects::matches_prefix,
};

/// Window and budget for one path prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub prefix: &'static str,
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitRule {
    pub const fn new(prefix: &'static str, window_secs: u64, max_requests: u32) -> Self {
        Self { prefix, window: Duration::from_secs(window_secs), max_requests }
    }

    fn window_delta(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.window.as_millis() as i64)
    }
}

/// Most specific prefixes first; the first match wins
pub const RATE_LIMIT_RULES: &[RateLimitRule] = &[
    RateLimitRule::new("/api/v1/auth/login", 15 * 60, 5),
    RateLimitRule::new("/api/v1/auth/register", 60 * 60, 3),
    RateLimitRule::new("/api/v1/auth/password-reset", 60 * 60, 3),
    RateLimitRule::new("/login", 15 * 60, 5),
    RateLimitRule::new("/register", 60 * 60, 3),
    RateLimitRule::new("/forgot-password", 60 * 60, 3),
    RateLimitRule::new("/api/v1/data/export", 60 * 60, 5),
    RateLimitRule::new("/api/v1/upload", 60, 10),
    RateLimitRule::new("/api", 60, 100),
];

/// Applies when no prefix matches
pub const DEFAULT_RATE_LIMIT_RULE: RateLimitRule = RateLimitRule::new("default", 60, 100);

const SWEEP_INTERVAL_MS: i64 = 60_000;

/// Ordered prefix table with a fallback rule
#[derive(Debug, Clone)]
pub struct RateLimitRules {
    rules: Vec<RateLimitRule>,
    fallback: RateLimitRule,
}

impl Default for RateLimitRules {
    fn default() -> Self {
        Self { rules: RATE_LIMIT_RULES.to_vec(), fallback: DEFAULT_RATE_LIMIT_RULE }
    }
}

impl RateLimitRules {
    pub fn new(rules: Vec<RateLimitRule>, fallback: RateLimitRule) -> Self {
        Self { rules, fallback }
    }

    /// Prefixes match on a segment boundary, so `/api/v1/upload` does not
    /// cover `/api/v1/uploads`
    pub fn resolve(&self, path: &str) -> &RateLimitRule {
        self.rules
            .iter()
            .find(|rule| matches_prefix(path, rule.prefix))
            .unwrap_or(&self.fallback)
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    /// Whole seconds until the window resets, set on rejection
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    fn rejected(limit: u32, reset_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_time,
            retry_after: Some(seconds_until(reset_time, now)),
        }
    }

    pub fn add_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset_time.timestamp()));

        if let Some(retry_after) = self.retry_after {
            headers.insert("retry-after", HeaderValue::from(retry_after));
        }
    }
}

/// Rounded up, never below one second
fn seconds_until(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (reset_time - now).num_milliseconds().max(0);
    ((millis + 999) / 1000).max(1) as u64
}

/// A rate limiting algorithm keyed by client identifier and path
#[async_trait]
pub trait RateLimitStrategy: Send + Sync {
    async fn check_at(
        &self,
        identifier: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError>;

    async fn check(&self, identifier: &str, path: &str) -> Result<RateLimitDecision, StoreError> {
        self.check_at(identifier, path, Utc::now()).await
    }
}

/// Counter and window end for one `(client, prefix)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

/// Fixed-window counter per `(client, prefix)`.
///
/// The counter is read and written with separate store calls, so concurrent
/// requests from one client may be slightly under- or over-counted.
pub struct FixedWindowRateLimiter {
    rules: RateLimitRules,
    store: Arc<dyn KeyValueStore<RateLimitEntry>>,
    sweep: SweepSchedule,
}

impl FixedWindowRateLimiter {
    pub fn new(rules: RateLimitRules, store: Arc<dyn KeyValueStore<RateLimitEntry>>) -> Self {
        Self { rules, store, sweep: SweepSchedule::new(SWEEP_INTERVAL_MS) }
    }

    pub fn rules(&self) -> &RateLimitRules {
        &self.rules
    }

    async fn sweep_if_due(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let removed = self.sweep.run_if_due(self.store.as_ref(), now).await?;
        if removed > 0 {
            debug!(removed, "Swept expired rate limit entries");
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitStrategy for FixedWindowRateLimiter {
    async fn check_at(
        &self,
        identifier: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        self.sweep_if_due(now).await?;

        let rule = self.rules.resolve(path);
        let key = format!("{identifier}:{}", rule.prefix);

        let entry = match self.store.get(&key).await? {
            Some(entry) if entry.reset_time > now => {
                RateLimitEntry { count: entry.count.saturating_add(1), ..entry }
            }
            _ => RateLimitEntry { count: 1, reset_time: now + rule.window_delta() },
        };
        self.store.set(&key, entry, entry.reset_time).await?;

        if entry.count > rule.max_requests {
            return Ok(RateLimitDecision::rejected(rule.max_requests, entry.reset_time, now));
        }

        Ok(RateLimitDecision {
            allowed: true,
            limit: rule.max_requests,
            remaining: rule.max_requests - entry.count,
            reset_time: entry.reset_time,
            retry_after: None,
        })
    }
}

/// Sliding window over a log of request timestamps (milliseconds)
pub struct SlidingWindowRateLimiter {
    rules: RateLimitRules,
    store: Arc<dyn KeyValueStore<Vec<i64>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(rules: RateLimitRules, store: Arc<dyn KeyValueStore<Vec<i64>>>) -> Self {
        Self { rules, store }
    }
}

#[async_trait]
impl RateLimitStrategy for SlidingWindowRateLimiter {
    async fn check_at(
        &self,
        identifier: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        let rule = self.rules.resolve(path);
        let key = format!("sliding:{identifier}:{}", rule.prefix);
        let now_ms = now.timestamp_millis();
        let window_ms = rule.window.as_millis() as i64;

        let mut timestamps = self.store.get(&key).await?.unwrap_or_default();
        timestamps.retain(|ts| *ts > now_ms - window_ms);

        let oldest = timestamps.first().copied().unwrap_or(now_ms);
        let reset_time = DateTime::from_timestamp_millis(oldest + window_ms).unwrap_or(now);

        if timestamps.len() >= rule.max_requests as usize {
            self.store.set(&key, timestamps, now + rule.window_delta()).await?;
            return Ok(RateLimitDecision::rejected(rule.max_requests, reset_time, now));
        }

        timestamps.push(now_ms);
        let used = timestamps.len() as u32;
        self.store.set(&key, timestamps, now + rule.window_delta()).await?;

        Ok(RateLimitDecision {
            allowed: true,
            limit: rule.max_requests,
            remaining: rule.max_requests - used,
            reset_time,
            retry_after: None,
        })
    }
}

/// Remaining tokens and the instant they were last topped up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketState {
    pub tokens: f64,
    pub last_refill_ms: i64,
}

/// Token bucket holding `max_requests` tokens, refilled evenly over the window
pub struct TokenBucketRateLimiter {
    rules: RateLimitRules,
    store: Arc<dyn KeyValueStore<TokenBucketState>>,
}

impl TokenBucketRateLimiter {
    pub fn new(rules: RateLimitRules, store: Arc<dyn KeyValueStore<TokenBucketState>>) -> Self {
        Self { rules, store }
    }
}

#[async_trait]
impl RateLimitStrategy for TokenBucketRateLimiter {
    async fn check_at(
        &self,
        identifier: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        let rule = self.rules.resolve(path);
        let key = format!("bucket:{identifier}:{}", rule.prefix);
        let now_ms = now.timestamp_millis();
        let capacity = f64::from(rule.max_requests);
        let window_ms = rule.window.as_millis().max(1) as f64;

        let state = self
            .store
            .get(&key)
            .await?
            .unwrap_or(TokenBucketState { tokens: capacity, last_refill_ms: now_ms });
        let elapsed = (now_ms - state.last_refill_ms).max(0) as f64;
        let mut tokens = (state.tokens + elapsed * capacity / window_ms).min(capacity);

        let allowed = tokens >= 1.0;
        if allowed {
            tokens -= 1.0;
        }

        self.store
            .set(
                &key,
                TokenBucketState { tokens, last_refill_ms: now_ms },
                now + rule.window_delta(),
            )
            .await?;

        let until_full_ms = ((capacity - tokens) * window_ms / capacity).ceil() as i64;
        let reset_time = now + TimeDelta::milliseconds(until_full_ms);

        if !allowed {
            let until_token_ms = ((1.0 - tokens) * window_ms / capacity).ceil() as i64;
            return Ok(RateLimitDecision::rejected(
                rule.max_requests,
                now + TimeDelta::milliseconds(until_token_ms),
                now,
            ));
        }

        Ok(RateLimitDecision {
            allowed: true,
            limit: rule.max_requests,
            remaining: tokens.floor() as u32,
            reset_time,
            retry_after: None,
        })
    }
}
