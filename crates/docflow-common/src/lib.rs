//! Shared plumbing for the docflow pipeline crates
//!
//! This crate carries the pieces every stage needs: correlation IDs for
//! tracing one job across service boundaries, the error-kind taxonomy the
//! orchestrator funnels stage failures through, the bounded-backoff retry
//! executor, and the per-key rate limiter that spaces outbound requests.

pub mod correlation;
pub mod error;
pub mod rate_limit;
pub mod retry;

pub use correlation::CorrelationId;
pub use error::{Cancelled, Classify, ErrorKind};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
