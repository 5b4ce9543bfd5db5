//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider call:
//!     → rate_limit.rs (wait for a token from the network's bucket)
//!     → adapter request (bounded by the network's request timeout)
//!
//! Reclaim retry:
//!     → backoff.rs (exponential delay with jitter before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Throughput is tuned through config, never through sleep constants
//! - Every external call has a deadline
//! - Failed calls are not retried inline; the next cycle retries them

pub mod backoff;
pub mod rate_limit;

pub use backoff::{backoff_delay, backoff_secs};
pub use rate_limit::RateLimiter;
