//! Tracing setup
//!
//! Configures the `tracing` subscriber for applications embedding the client.
//! Libraries never install a subscriber themselves; binaries call one of the
//! init functions early in `main`.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    pub level: Level,
    /// Enable JSON output format
    pub json: bool,
    /// Include file and line numbers
    pub file_line: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            file_line: false,
        }
    }
}

impl TracingConfig {
    /// Development configuration with debug logging and source locations
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json: false,
            file_line: true,
        }
    }

    /// Production configuration with JSON output
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json: true,
            file_line: false,
        }
    }
}

/// Initialize the tracing subscriber with default configuration.
///
/// Uses the `RUST_LOG` environment variable for filtering if set.
///
/// # Panics
/// Panics if a subscriber is already installed.
pub fn init_tracing() {
    init_tracing_with_config(TracingConfig::default());
}

/// Initialize the tracing subscriber with custom configuration.
///
/// # Panics
/// Panics if a subscriber is already installed.
pub fn init_tracing_with_config(config: TracingConfig) {
    try_init_with_config(config).expect("tracing subscriber already installed");
}

/// Fallible variant of [`init_tracing`], useful in tests where multiple
/// callers may race to install a subscriber.
pub fn try_init_tracing() -> Result<(), TryInitError> {
    try_init_with_config(TracingConfig::default())
}

fn try_init_with_config(config: TracingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    if config.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_file(config.file_line)
            .with_line_number(config.file_line);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_file(config.file_line)
            .with_line_number(config.file_line);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    }
}
