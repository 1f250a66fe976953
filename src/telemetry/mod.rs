//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → collector.rs (atomic counters, in-flight gauge)
//!
//! Every heartbeat tick (heartbeat.rs):
//!     collector.rs rollup (rps, mean latency, uptime, health)
//!     → anomaly.rs (EMA baseline, anomaly score, risk, chaos smoothing)
//!     → history.rs (ring buffer of combined snapshots)
//!     → observability gauges
//! ```
//!
//! # Design Decisions
//! - The request path only performs atomic increments
//! - Derived values have one writer (the heartbeat) and many readers
//! - Snapshots are published whole, never field by field

pub mod anomaly;
pub mod collector;
pub mod heartbeat;
pub mod history;

pub use anomaly::{AnomalyDetector, AnomalyStats};
pub use collector::{HealthStatus, HealthThresholds, MetricsSnapshot, TelemetryCollector};
pub use heartbeat::{Heartbeat, PressureSource, SystemSnapshot};
pub use history::{TemporalHistory, TemporalSnapshot};
