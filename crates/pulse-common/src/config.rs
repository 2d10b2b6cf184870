//! Client configuration
//!
//! Loads client defaults from environment variables.

use crate::intents::Intents;
use std::env;
use std::time::Duration;

/// Default REST API base URL
const DEFAULT_API_BASE: &str = "https://api.pulse.chat/v1";

/// Default REST transport timeout
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Default number of 502 retries before giving up
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of heartbeat intervals without an ACK before the
/// connection is considered dead
const DEFAULT_MISSED_ACK_THRESHOLD: u32 = 5;

/// Default safety margin added to header-derived rate limit resets
const DEFAULT_RESET_MARGIN_MS: u64 = 250;

/// Client configuration
///
/// Constructed once per client and shared by the REST and gateway layers.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Authentication token, including its scheme prefix (e.g. `Bot ...`)
    pub token: String,

    /// REST API base URL
    pub api_base: String,

    /// User-Agent header sent with every REST request
    pub user_agent: String,

    /// REST transport timeout
    pub request_timeout: Duration,

    /// Maximum 502 retries per request
    pub max_retries: u32,

    /// Whether 429 responses are retried transparently
    pub retry_on_rate_limit: bool,

    /// Gateway capability bitmask sent with Identify
    pub intents: Intents,

    /// Optional shard `[index, count]` sent with Identify
    pub shard: Option<[u32; 2]>,

    /// Whether to negotiate zlib compression on the gateway socket
    pub compress: bool,

    /// Whether fatal socket errors trigger automatic reconnection
    pub reconnect_on_error: bool,

    /// Heartbeat intervals without an ACK before forcing a reconnect
    pub missed_ack_threshold: u32,

    /// Safety margin added to header-derived bucket resets
    pub reset_margin: Duration,
}

impl ClientConfig {
    /// Create a configuration with default policies for the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: default_user_agent(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_on_rate_limit: true,
            intents: Intents::default(),
            shard: None,
            compress: true,
            reconnect_on_error: true,
            missed_ack_threshold: DEFAULT_MISSED_ACK_THRESHOLD,
            reset_margin: Duration::from_millis(DEFAULT_RESET_MARGIN_MS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `PULSE_TOKEN` (required), `PULSE_API_BASE`,
    /// `PULSE_REQUEST_TIMEOUT_SECS`, `PULSE_MAX_RETRIES` and
    /// `PULSE_INTENTS`. A `.env` file is honored when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let token = env::var("PULSE_TOKEN").map_err(|_| ConfigError::MissingToken)?;
        let mut config = Self::new(token);

        if let Ok(base) = env::var("PULSE_API_BASE") {
            config.api_base = base;
        }
        if let Some(secs) = parse_env("PULSE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_env("PULSE_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(bits) = parse_env("PULSE_INTENTS")? {
            config.intents = Intents::from_bits_truncate(bits);
        }

        Ok(config)
    }

    /// Set the gateway intents
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    /// Set the shard index and count
    #[must_use]
    pub fn with_shard(mut self, index: u32, count: u32) -> Self {
        self.shard = Some([index, count]);
        self
    }

    /// Disable transparent 429 retries
    #[must_use]
    pub fn without_rate_limit_retry(mut self) -> Self {
        self.retry_on_rate_limit = false;
        self
    }

    /// Disable automatic reconnection on socket errors
    #[must_use]
    pub fn without_auto_reconnect(mut self) -> Self {
        self.reconnect_on_error = false;
        self
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `PULSE_TOKEN` was not set
    #[error("PULSE_TOKEN environment variable is not set")]
    MissingToken,

    /// An environment variable held a value that failed to parse
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

fn default_user_agent() -> String {
    format!(
        "PulseBot (https://github.com/pulse-rs/pulse, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn parse_env<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("Bot abc123");
        assert_eq!(config.token, "Bot abc123");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.missed_ack_threshold, 5);
        assert_eq!(config.reset_margin, Duration::from_millis(250));
        assert!(config.retry_on_rate_limit);
        assert!(config.reconnect_on_error);
        assert!(config.shard.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::new("Bot abc123")
            .with_shard(2, 8)
            .without_rate_limit_retry()
            .without_auto_reconnect();

        assert_eq!(config.shard, Some([2, 8]));
        assert!(!config.retry_on_rate_limit);
        assert!(!config.reconnect_on_error);
    }
}
