//! Per-request options
//!
//! Overridable policy for a single REST call. Options are constructed
//! fresh per call and layered on top of the client's defaults after the
//! base request is built, so they always win.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Per-call request configuration
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Replacement HTTP client for this call only
    pub(crate) client: Option<reqwest::Client>,
    /// Override the client's 429 retry policy
    pub(crate) retry_on_rate_limit: Option<bool>,
    /// Override the client's 502 retry budget
    pub(crate) max_retries: Option<u32>,
    /// Extra headers set after the base request is constructed
    pub(crate) headers: HeaderMap,
    /// Deadline for a single attempt
    pub(crate) timeout: Option<Duration>,
}

impl RequestOptions {
    /// Create empty options (client defaults apply)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different HTTP client for this request
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Control whether this request retries transparently on 429
    #[must_use]
    pub fn with_retry_on_rate_limit(mut self, retry: bool) -> Self {
        self.retry_on_rate_limit = Some(retry);
        self
    }

    /// Change the maximum number of 502 retries for this request
    #[must_use]
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Set a header on this request, overriding any default
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach an audit log reason to this request
    #[must_use]
    pub fn with_audit_reason(self, reason: &str) -> Self {
        match HeaderValue::from_str(reason) {
            Ok(value) => self.with_header(HeaderName::from_static("x-audit-log-reason"), value),
            Err(_) => self,
        }
    }

    /// Bound a single attempt by `timeout`, independent of the client's
    /// transport timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_empty() {
        let options = RequestOptions::new();
        assert!(options.client.is_none());
        assert!(options.retry_on_rate_limit.is_none());
        assert!(options.max_retries.is_none());
        assert!(options.headers.is_empty());
        assert!(options.timeout.is_none());
    }

    #[test]
    fn test_audit_reason_header() {
        let options = RequestOptions::new().with_audit_reason("spam cleanup");
        assert_eq!(
            options.headers.get("x-audit-log-reason").unwrap(),
            "spam cleanup"
        );
    }

    #[test]
    fn test_invalid_audit_reason_dropped() {
        let options = RequestOptions::new().with_audit_reason("bad\nreason");
        assert!(options.headers.is_empty());
    }
}
