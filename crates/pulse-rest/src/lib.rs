//! # pulse-rest
//!
//! Rate-limited REST dispatcher for the Pulse API.
//!
//! Every request is serialized through a per-route [`ratelimit::Bucket`],
//! with a shared global gate that can suspend all routes at once. Bucket
//! state is fed back from the `X-RateLimit-*` response headers, so the
//! client stays inside the server's limits without hard-coding them.

pub mod error;
pub mod executor;
pub mod models;
pub mod options;
pub mod ratelimit;

// Re-export commonly used types at crate root
pub use error::RestError;
pub use executor::RestClient;
pub use models::{ApiErrorBody, GatewayInfo, RateLimitEvent, TooManyRequests};
pub use options::RequestOptions;
pub use ratelimit::{BucketOverride, RateLimiter};
