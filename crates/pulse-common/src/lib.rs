//! # pulse-common
//!
//! Shared configuration, intents and telemetry setup for the Pulse client.

pub mod config;
pub mod intents;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::ClientConfig;
pub use intents::Intents;
pub use telemetry::{init_tracing, init_tracing_with_config, try_init_tracing, TracingConfig};
