//! Rate limiting
//!
//! Per-route buckets plus one shared global gate. A request locks its
//! bucket before any I/O, holds the lock through the HTTP exchange and
//! releases it with the response headers so the bucket learns the
//! server's current limits.

mod bucket;
mod limiter;

pub use bucket::{Bucket, BucketOverride, LockedBucket};
pub use limiter::RateLimiter;
