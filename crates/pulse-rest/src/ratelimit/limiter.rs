//! Rate limiter
//!
//! Owns the bucket registry and the shared global gate. One limiter is
//! created per client instance and lives for the client's lifetime; it is
//! never a process-wide singleton, so independent clients in one process
//! cannot cross-contaminate each other's limits.

use super::bucket::{wait_duration, Bucket, BucketOverride, GlobalGate, LockedBucket};
use crate::models::RateLimitEvent;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Buffer size for the rate-limit notification channel
const EVENT_BUFFER_SIZE: usize = 64;

/// Registry of rate limit buckets keyed by route, plus the global gate
pub struct RateLimiter {
    /// Buckets are created lazily and never removed
    buckets: DashMap<String, Bucket>,
    global: Arc<GlobalGate>,
    /// Matched by key suffix at bucket creation, in declared order
    overrides: Vec<BucketOverride>,
    reset_margin: Duration,
    events: broadcast::Sender<RateLimitEvent>,
}

impl RateLimiter {
    /// Create a limiter with the default overrides and reset margin
    #[must_use]
    pub fn new() -> Self {
        Self::with_overrides(default_overrides(), Duration::from_millis(250))
    }

    /// Create a limiter with the default overrides and a custom reset margin
    #[must_use]
    pub fn with_reset_margin(reset_margin: Duration) -> Self {
        Self::with_overrides(default_overrides(), reset_margin)
    }

    /// Create a limiter with explicit overrides and reset margin.
    ///
    /// Overrides are matched first-match-wins in the order given, so more
    /// specific suffixes must be listed first.
    #[must_use]
    pub fn with_overrides(overrides: Vec<BucketOverride>, reset_margin: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            buckets: DashMap::new(),
            global: Arc::new(GlobalGate::new()),
            overrides,
            reset_margin,
            events,
        }
    }

    /// Return the bucket for `key`, creating it on first use.
    ///
    /// A new bucket starts with `remaining = 1`, allowing exactly one
    /// speculative call before any server feedback exists.
    #[must_use]
    pub fn bucket(&self, key: &str) -> Bucket {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                let custom = self
                    .overrides
                    .iter()
                    .find(|o| key.ends_with(&o.suffix))
                    .cloned();
                if let Some(ref custom) = custom {
                    tracing::debug!(key, suffix = %custom.suffix, "Bucket created with custom override");
                }
                Bucket::new(key, custom)
            })
            .clone()
    }

    /// Acquire the bucket for `key`, waiting out any per-route or global
    /// limit first, and decrement its remaining count.
    pub async fn lock_bucket(&self, key: &str) -> LockedBucket {
        let bucket = self.bucket(key);
        let mut guard = bucket.state().lock_owned().await;

        let wait = wait_duration(&guard, self.global.deadline(), 1);
        if !wait.is_zero() {
            tracing::debug!(key, wait_ms = wait.as_millis() as u64, "Waiting on rate limit");
            tokio::time::sleep(wait).await;
        }
        guard.remaining -= 1;

        LockedBucket {
            guard,
            global: Arc::clone(&self.global),
            reset_margin: self.reset_margin,
        }
    }

    /// Time a request through `key` would currently wait before sending
    #[must_use]
    pub fn would_wait(&self, key: &str) -> Duration {
        let bucket = self.bucket(key);
        let state = bucket.state();
        let guard = state.try_lock();
        match guard {
            Ok(guard) => wait_duration(&guard, self.global.deadline(), 1),
            // Held by an in-flight request; the wait is at least until it
            // releases, which we cannot quantify here.
            Err(_) => Duration::ZERO,
        }
    }

    /// Set the shared global deadline, freezing every bucket until `at`
    pub fn set_global_deadline(&self, at: Instant) {
        self.global.set(at);
    }

    /// Subscribe to rate-limit notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RateLimitEvent> {
        self.events.subscribe()
    }

    /// Emit a rate-limit notification.
    ///
    /// Fire-and-forget: a send with no subscribers, or with slow
    /// subscribers, never blocks or fails the executor.
    pub fn notify(&self, event: RateLimitEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes whose limits are not reported through headers
fn default_overrides() -> Vec<BucketOverride> {
    vec![BucketOverride {
        suffix: "/reactions".to_string(),
        requests: 1,
        window: Duration::from_millis(250),
    }]
}
