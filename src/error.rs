//! Construction-time errors.
//!
//! The admission primitives have no fallible runtime path: denials are
//! plain `false` results. Only invalid parameters are reported, and they
//! are reported before anything is built.

use std::time::Duration;

/// Error returned when a component is constructed with invalid parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("token refill rate must be a positive finite number, got {0}")]
    InvalidRate(f64),

    #[error("bucket capacity must be a non-negative finite number, got {0}")]
    InvalidCapacity(f64),

    #[error("concurrency bounds are invalid: min_limit={min}, max_limit={max}")]
    InvalidConcurrencyBounds { min: usize, max: usize },

    #[error("target latency must be greater than zero, got {0:?}")]
    InvalidTargetLatency(Duration),

    #[error("history capacity must be at least 1")]
    InvalidHistoryCapacity,

    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },
}
