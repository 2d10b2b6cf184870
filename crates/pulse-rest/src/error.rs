//! REST error types

use std::time::Duration;

/// Errors returned by REST requests
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Network, DNS or TLS failure. Never retried by this layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request hit 502 more times than the retry budget allows
    #[error("exceeded max retries ({attempts}) on {url}")]
    RetriesExceeded { url: String, attempts: u32 },

    /// The request was rate limited and automatic retry is disabled.
    ///
    /// The request may be retried manually after `retry_after`.
    #[error("rate limit exceeded on {url}, retry after {retry_after:?}")]
    RateLimited {
        url: String,
        retry_after: Duration,
        global: bool,
    },

    /// 401 with a token that does not carry the `Bot ` scheme prefix
    #[error("request was unauthorized; bot tokens must be prefixed with \"Bot \"")]
    InvalidAuthScheme,

    /// Any other non-2xx response.
    ///
    /// `code` and `message` come from the structured error body when it
    /// decodes; `message` falls back to the raw body otherwise.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// A rate-limit response header failed to parse
    #[error("malformed {name} header: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// A response body failed to decode as JSON
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    /// HTTP status carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::InvalidAuthScheme => Some(401),
            _ => None,
        }
    }

    /// Whether the caller can retry the request after a delay
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::RetriesExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = RestError::Api {
            status: 404,
            code: Some(10003),
            message: "Unknown channel".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_retryable());

        let limited = RestError::RateLimited {
            url: "/channels/1/messages".to_string(),
            retry_after: Duration::from_millis(500),
            global: false,
        };
        assert_eq!(limited.status(), Some(429));
        assert!(limited.is_retryable());
    }
}
