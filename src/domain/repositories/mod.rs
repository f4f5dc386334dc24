use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

/// Errors raised by a key-value store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store serialization error: {message}")]
    Serialization { message: String },
}

/// Expiring key-value storage shared by the rate limiters and the request timing check.
///
/// Reads and writes are separate calls: a read-modify-write sequence is not
/// atomic across concurrent requests. The in-memory and any external backend
/// are interchangeable behind this trait.
#[async_trait]
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Fetch a live value; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Store a value until `expires_at`
    async fn set(&self, key: &str, value: V, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Drop every entry that expired at or before `now`, returning how many were removed
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Lazy eviction for a [`KeyValueStore`]: at most one `sweep` per interval,
/// triggered from the request path instead of a background task.
#[derive(Debug)]
pub struct SweepSchedule {
    interval_ms: i64,
    last_sweep_ms: AtomicI64,
}

impl SweepSchedule {
    pub const fn new(interval_ms: i64) -> Self {
        Self { interval_ms, last_sweep_ms: AtomicI64::new(0) }
    }

    /// Sweep `store` if the interval has passed since the last sweep.
    /// Returns how many entries were removed.
    pub async fn run_if_due<V>(
        &self,
        store: &dyn KeyValueStore<V>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms - last < self.interval_ms {
            return Ok(0);
        }
        // Only one caller wins the slot for this interval
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return Ok(0);
        }
        store.sweep(now).await
    }
}
