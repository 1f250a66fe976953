//! Admission control primitives.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → governor.rs (adaptive in-flight ceiling, AIMD on latency)
//!     → rate_limit.rs (token bucket, global requests/second)
//!     → handler runs
//!     → governor.rs release(observed latency) adjusts the ceiling
//! ```
//!
//! # Design Decisions
//! - Backpressure is expressed by denial, never by waiting
//! - Critical sections are a handful of arithmetic operations
//! - No handler logic ever runs while a lock is held

pub mod governor;
pub mod rate_limit;

pub use governor::{ConcurrencyGovernor, ConcurrencyPermit};
pub use rate_limit::RateLimiter;
