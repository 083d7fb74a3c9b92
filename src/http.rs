//! Upstream HTTP plumbing: the shared rate limiter, retry policies and
//! backoff, request metrics, auth headers, and the client that ties them
//! together.

pub mod auth;
pub mod client;
pub mod limiter;
pub mod metrics;
pub mod options;
pub mod retry;

pub use client::{ApiClient, FetchError};
pub use limiter::RateLimiter;
pub use metrics::ApiMetricsSnapshot;
pub use options::FetchPolicy;
pub use retry::{backoff_delay, parse_retry_after};
