//! Adaptive admission control and telemetry for HTTP services.
//!
//! A token bucket and an AIMD concurrency governor shed excess traffic in
//! front of a request handler, while a telemetry heartbeat rolls request
//! counters into rates, health, anomaly and risk figures that are kept in a
//! fixed-size history.

// Admission and telemetry core
pub mod admission;
pub mod middleware;
pub mod telemetry;

// Serving
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use admission::{ConcurrencyGovernor, ConcurrencyPermit, RateLimiter};
pub use config::GuardConfig;
pub use error::Error;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use middleware::{Chain, Handler, Middleware};
pub use telemetry::{AnomalyDetector, Heartbeat, TelemetryCollector, TemporalHistory};
