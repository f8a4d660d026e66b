//! Utility modules for xrf-ingest

pub mod backoff;

pub use backoff::{backoff_delay, retry_with_backoff, RateLimiter};
