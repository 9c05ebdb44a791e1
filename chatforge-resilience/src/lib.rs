//! Resilience primitives for Chatforge
//!
//! Pure policy engines shared by the queue and cluster layers: retry
//! policies with backoff, a token-bucket rate limiter, and a graceful
//! shutdown coordinator. The policies here are functions of their inputs
//! only; anything that touches the clock lives behind tokio's time so the
//! timing behavior is testable with a paused clock.

pub mod backoff;
pub mod rate_limit;
pub mod retry;
pub mod shutdown;

pub use backoff::BackoffKind;
pub use rate_limit::TokenBucket;
pub use retry::RetryPolicy;
pub use shutdown::ShutdownCoordinator;
