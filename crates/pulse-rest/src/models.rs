//! REST wire models
//!
//! The handful of bodies the dispatcher itself understands: the structured
//! error body, the 429 body and the gateway bootstrap response. Everything
//! endpoint-specific lives with its caller.

use serde::Deserialize;
use std::time::Duration;

/// Structured error body returned with non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Platform-specific error code
    pub code: Option<i64>,
    /// Human-readable message
    pub message: Option<String>,
}

/// Body of a 429 response
#[derive(Debug, Clone, Deserialize)]
pub struct TooManyRequests {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// How long to wait before retrying, in fractional seconds
    pub retry_after: f64,
    /// Whether the global limit was hit rather than a route limit
    #[serde(default)]
    pub global: bool,
    /// Server-side bucket identifier, when provided
    #[serde(default)]
    pub bucket: Option<String>,
}

impl TooManyRequests {
    /// The retry delay as a [`Duration`]
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs_f64(self.retry_after.max(0.0))
    }
}

/// Response of `GET /gateway`
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    /// Websocket URL to dial for the event stream
    pub url: String,
}

/// Notification emitted when a request is rate limited.
///
/// Delivered fire-and-forget on the limiter's broadcast channel; slow
/// subscribers never block the executor.
#[derive(Debug, Clone)]
pub struct RateLimitEvent {
    /// Full request URL that was limited
    pub url: String,
    /// Bucket key the request was serialized through
    pub bucket_key: String,
    /// Message from the 429 body
    pub message: String,
    /// How long the executor will wait (or the caller should wait)
    pub retry_after: Duration,
    /// Whether the global limit was hit
    pub global: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_requests_decodes() {
        let body: TooManyRequests = serde_json::from_str(
            r#"{"message": "You are being rate limited.", "retry_after": 0.529, "global": false, "bucket": "abcd1234"}"#,
        )
        .unwrap();

        assert_eq!(body.retry_after(), Duration::from_millis(529));
        assert!(!body.global);
        assert_eq!(body.bucket.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn test_too_many_requests_minimal() {
        let body: TooManyRequests = serde_json::from_str(r#"{"retry_after": 1.0}"#).unwrap();
        assert_eq!(body.retry_after(), Duration::from_secs(1));
        assert!(body.message.is_empty());
        assert!(body.bucket.is_none());
    }

    #[test]
    fn test_negative_retry_after_clamped() {
        let body: TooManyRequests = serde_json::from_str(r#"{"retry_after": -2.0}"#).unwrap();
        assert_eq!(body.retry_after(), Duration::ZERO);
    }
}
