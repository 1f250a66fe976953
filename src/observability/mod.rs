//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request path:
//!     → request span with x-request-id (middleware/request_id.rs)
//!     → metrics.rs counters (requests, rejections by reason)
//!
//! Heartbeat:
//!     → metrics.rs gauges (rps, latency, health, anomaly, concurrency limit)
//!     → logging.rs health transition events
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until a recorder is installed, so tests need no setup
//! - Log format is chosen once at startup

pub mod logging;
pub mod metrics;
