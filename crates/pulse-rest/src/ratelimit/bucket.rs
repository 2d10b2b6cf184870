//! Rate limit buckets
//!
//! A [`Bucket`] is one rate-limit counter scoping one route (or route
//! family). Its mutex serializes requests: at most one in-flight request
//! holds a bucket at a time, and the holder updates the counters from the
//! response headers before letting the next caller through.

use crate::error::RestError;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
const HEADER_RESET: &str = "X-RateLimit-Reset";
const HEADER_RESET_AFTER: &str = "X-RateLimit-Reset-After";
const HEADER_GLOBAL: &str = "X-RateLimit-Global";

/// A fixed-window rate rule applied to routes matching a key suffix,
/// used instead of server-header-derived limits.
#[derive(Debug, Clone)]
pub struct BucketOverride {
    /// Bucket keys ending with this string get the override
    pub suffix: String,
    /// Requests allowed per window
    pub requests: i64,
    /// Window duration
    pub window: Duration,
}

/// Mutable bucket state, guarded by the bucket's mutex
#[derive(Debug)]
pub(crate) struct BucketState {
    pub key: String,
    /// Calls left in the current window
    pub remaining: i64,
    /// Last limit reported by the server, informational
    pub limit: i64,
    /// When the route's window resets
    pub reset_at: Option<Instant>,
    /// Start of the current fixed window (override buckets only)
    pub last_reset: Instant,
    /// Fixed-window rule attached at creation, if any
    pub custom: Option<BucketOverride>,
}

/// A single rate-limit counter plus its mutex
#[derive(Clone)]
pub struct Bucket {
    state: Arc<Mutex<BucketState>>,
}

impl Bucket {
    pub(crate) fn new(key: impl Into<String>, custom: Option<BucketOverride>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BucketState {
                key: key.into(),
                // One speculative call is allowed before any server feedback.
                remaining: 1,
                limit: 1,
                reset_at: None,
                last_reset: Instant::now(),
                custom,
            })),
        }
    }

    pub(crate) fn state(&self) -> Arc<Mutex<BucketState>> {
        Arc::clone(&self.state)
    }
}

/// The shared global gate: a single deadline that, while in the future,
/// suspends every bucket regardless of its own counters.
#[derive(Debug)]
pub(crate) struct GlobalGate {
    epoch: Instant,
    /// Nanoseconds after `epoch`; zero means no global limit active
    deadline_nanos: AtomicU64,
}

impl GlobalGate {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline_nanos: AtomicU64::new(0),
        }
    }

    pub fn set(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.epoch).as_nanos() as u64;
        self.deadline_nanos.store(nanos.max(1), Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.deadline_nanos.load(Ordering::SeqCst) {
            0 => None,
            nanos => Some(self.epoch + Duration::from_nanos(nanos)),
        }
    }
}

/// Time the calling task must wait before it may send a request through
/// this bucket: the later of the bucket's own reset (when fewer than
/// `min_remaining` calls are left) and the global gate.
pub(crate) fn wait_duration(
    state: &BucketState,
    global_deadline: Option<Instant>,
    min_remaining: i64,
) -> Duration {
    let now = Instant::now();
    let mut wait = Duration::ZERO;

    if state.remaining < min_remaining {
        if let Some(reset_at) = state.reset_at {
            if reset_at > now {
                wait = reset_at - now;
            }
        }
    }

    if let Some(global) = global_deadline {
        if global > now {
            wait = wait.max(global - now);
        }
    }

    wait
}

/// A bucket whose mutex is held by the current request.
///
/// Dropping the guard unlocks the bucket, so the lock is freed on every
/// exit path whether or not [`release`](Self::release) ran.
pub struct LockedBucket {
    pub(crate) guard: OwnedMutexGuard<BucketState>,
    pub(crate) global: Arc<GlobalGate>,
    pub(crate) reset_margin: Duration,
}

impl LockedBucket {
    /// The key this bucket scopes
    #[must_use]
    pub fn key(&self) -> &str {
        &self.guard.key
    }

    /// Update the bucket from response headers and unlock it.
    ///
    /// Pass `None` after a transport failure: the bucket state is left
    /// untouched but the lock is still freed.
    pub fn release(mut self, headers: Option<&HeaderMap>) -> Result<(), RestError> {
        if let Some(custom) = self.guard.custom.clone() {
            release_custom(&mut self.guard, &custom);
            return Ok(());
        }

        let Some(headers) = headers else {
            return Ok(());
        };

        let remaining = header_str(headers, HEADER_REMAINING);
        let reset = header_str(headers, HEADER_RESET);
        let reset_after = header_str(headers, HEADER_RESET_AFTER);
        let global = headers.contains_key(HEADER_GLOBAL);

        if let Some(after) = reset_after {
            let seconds: f64 = after.parse().map_err(|_| RestError::InvalidHeader {
                name: HEADER_RESET_AFTER,
                value: after.to_string(),
            })?;
            let reset_at = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));

            if global {
                // A global limit freezes every bucket, not just this one.
                self.global.set(reset_at);
            } else {
                self.guard.reset_at = Some(reset_at);
            }
        } else if let Some(reset) = reset {
            // No relative reset given: derive it from the absolute reset
            // time minus the server's own clock, tolerating skew between
            // the server's clock and ours.
            let date = header_str(headers, "Date").ok_or(RestError::InvalidHeader {
                name: "Date",
                value: String::new(),
            })?;
            let server_now =
                chrono::DateTime::parse_from_rfc2822(date).map_err(|_| RestError::InvalidHeader {
                    name: "Date",
                    value: date.to_string(),
                })?;
            let reset_unix: f64 = reset.parse().map_err(|_| RestError::InvalidHeader {
                name: HEADER_RESET,
                value: reset.to_string(),
            })?;

            let delta_ms = (reset_unix * 1000.0) as i64 - server_now.timestamp_millis()
                + self.reset_margin.as_millis() as i64;
            if delta_ms > 0 {
                self.guard.reset_at = Some(Instant::now() + Duration::from_millis(delta_ms as u64));
            }
        }

        // Remaining is updated regardless of which reset path was taken.
        if let Some(remaining) = remaining {
            let parsed: i64 = remaining.parse().map_err(|_| RestError::InvalidHeader {
                name: HEADER_REMAINING,
                value: remaining.to_string(),
            })?;
            self.guard.remaining = parsed;
            self.guard.limit = self.guard.limit.max(parsed);
        }

        Ok(())
    }
}

/// Fixed-window accounting for buckets with a custom override. Headers
/// are ignored for these routes.
fn release_custom(state: &mut BucketState, custom: &BucketOverride) {
    let now = Instant::now();

    if now.duration_since(state.last_reset) >= custom.window {
        state.remaining = custom.requests - 1;
        state.last_reset = now;
    } else if state.remaining < 1 {
        state.reset_at = Some(now + custom.window);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn state(remaining: i64, reset_at: Option<Instant>) -> BucketState {
        BucketState {
            key: "/channels/1/messages".to_string(),
            remaining,
            limit: 5,
            reset_at,
            last_reset: Instant::now(),
            custom: None,
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    async fn locked(bucket: &Bucket) -> LockedBucket {
        LockedBucket {
            guard: bucket.state().lock_owned().await,
            global: Arc::new(GlobalGate::new()),
            reset_margin: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_no_wait_with_remaining() {
        let s = state(1, Some(Instant::now() + Duration::from_secs(5)));
        assert_eq!(wait_duration(&s, None, 1), Duration::ZERO);
    }

    #[test]
    fn test_waits_until_reset_when_exhausted() {
        let s = state(0, Some(Instant::now() + Duration::from_secs(5)));
        let wait = wait_duration(&s, None, 1);
        assert!(wait > Duration::from_secs(4));
        assert!(wait <= Duration::from_secs(5));
    }

    #[test]
    fn test_expired_reset_does_not_wait() {
        let s = state(0, Some(Instant::now() - Duration::from_secs(1)));
        assert_eq!(wait_duration(&s, None, 1), Duration::ZERO);
    }

    #[test]
    fn test_global_overrides_healthy_bucket() {
        let s = state(10, None);
        let global = Some(Instant::now() + Duration::from_secs(3));
        let wait = wait_duration(&s, global, 1);
        assert!(wait > Duration::from_secs(2));
    }

    #[test]
    fn test_global_extends_bucket_wait() {
        let s = state(0, Some(Instant::now() + Duration::from_secs(1)));
        let global = Some(Instant::now() + Duration::from_secs(4));
        let wait = wait_duration(&s, global, 1);
        assert!(wait > Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_release_prefers_reset_after() {
        let bucket = Bucket::new("/channels/1/messages", None);
        let lock = locked(&bucket).await;
        lock.release(Some(&headers(&[
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset-After", "1.5"),
            // Reset would put the deadline much further out; it must lose.
            ("X-RateLimit-Reset", "99999999999"),
            ("Date", "Tue, 02 Feb 2021 00:00:00 GMT"),
        ])))
        .unwrap();

        let s = bucket.state();
        let s = s.try_lock().unwrap();
        assert_eq!(s.remaining, 0);
        let wait = s.reset_at.unwrap() - Instant::now();
        assert!(wait <= Duration::from_millis(1500));
        assert!(wait > Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn test_release_reset_minus_date_with_margin() {
        let bucket = Bucket::new("/channels/1/messages", None);
        let lock = locked(&bucket).await;
        // Server clock says the reset is 2s after its own Date header,
        // regardless of what our clock thinks the absolute time is.
        lock.release(Some(&headers(&[
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset", "1612224002"),
            ("Date", "Mon, 01 Feb 2021 23:59:62 GMT"), // unparseable seconds
        ])))
        .unwrap_err();

        let lock = locked(&bucket).await;
        lock.release(Some(&headers(&[
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset", "1612224002"),
            ("Date", "Tue, 02 Feb 2021 00:00:00 GMT"),
        ])))
        .unwrap();

        let s = bucket.state();
        let s = s.try_lock().unwrap();
        let wait = s.reset_at.unwrap() - Instant::now();
        // 2s skew-derived delta plus the 250ms margin
        assert!(wait > Duration::from_millis(2100));
        assert!(wait <= Duration::from_millis(2250));
    }

    #[tokio::test]
    async fn test_release_global_routes_to_shared_gate() {
        let bucket = Bucket::new("/channels/1/messages", None);
        let gate = Arc::new(GlobalGate::new());
        let lock = LockedBucket {
            guard: bucket.state().lock_owned().await,
            global: Arc::clone(&gate),
            reset_margin: Duration::from_millis(250),
        };
        lock.release(Some(&headers(&[
            ("X-RateLimit-Global", "true"),
            ("X-RateLimit-Reset-After", "2.0"),
        ])))
        .unwrap();

        let s = bucket.state();
        let s = s.try_lock().unwrap();
        // The bucket's own reset stays untouched; the shared gate moved.
        assert!(s.reset_at.is_none());
        assert!(gate.deadline().unwrap() > Instant::now() + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_release_without_headers_is_noop() {
        let bucket = Bucket::new("/gateway", None);
        let lock = locked(&bucket).await;
        lock.release(None).unwrap();

        let s = bucket.state();
        let s = s.try_lock().unwrap();
        assert_eq!(s.remaining, 1);
        assert!(s.reset_at.is_none());
    }

    #[tokio::test]
    async fn test_custom_override_ignores_headers() {
        let bucket = Bucket::new(
            "/channels/1/reactions",
            Some(BucketOverride {
                suffix: "/reactions".to_string(),
                requests: 1,
                window: Duration::from_millis(200),
            }),
        );

        let lock = locked(&bucket).await;
        lock.release(Some(&headers(&[("X-RateLimit-Remaining", "99")])))
            .unwrap();

        let s = bucket.state();
        let s = s.try_lock().unwrap();
        assert_ne!(s.remaining, 99);
    }
}
