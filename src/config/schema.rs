//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every section falls back to its defaults, so an empty file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Token bucket in front of the handler.
    pub rate_limit: RateLimitConfig,

    /// Adaptive concurrency governor.
    pub concurrency: ConcurrencyConfig,

    /// Counters, rollup cadence and health thresholds.
    pub telemetry: TelemetryConfig,

    /// Anomaly detector tuning.
    pub anomaly: AnomalyConfig,

    pub chaos: ChaosConfig,

    pub cors: CorsConfig,

    /// Logging and metrics export.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed per request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Refill rate in tokens per second.
    pub requests_per_second: f64,

    /// Bucket capacity (maximum burst).
    pub burst_size: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100.0,
            burst_size: 50.0,
        }
    }
}

/// Adaptive concurrency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub enabled: bool,

    /// Floor and starting value of the in-flight ceiling.
    pub min_limit: usize,

    /// Upper bound of the in-flight ceiling.
    pub max_limit: usize,

    /// Completions at or under this latency raise the ceiling.
    pub target_latency_ms: u64,
}

impl ConcurrencyConfig {
    pub fn target_latency(&self) -> Duration {
        Duration::from_millis(self.target_latency_ms)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_limit: 10,
            max_limit: 100,
            target_latency_ms: 50,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Rollup period in milliseconds.
    pub rollup_interval_ms: u64,

    /// Number of rollup snapshots retained.
    pub history_capacity: usize,

    /// Mean latency (ms) above which health is DEGRADED.
    pub degraded_latency_ms: f64,

    /// CPU proxy (%) above which health is DEGRADED.
    pub degraded_cpu_pct: f64,

    /// Error ratio (0..=1) above which health is CRITICAL.
    pub critical_error_ratio: f64,
}

impl TelemetryConfig {
    pub fn rollup_interval(&self) -> Duration {
        Duration::from_millis(self.rollup_interval_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            rollup_interval_ms: 250,
            history_capacity: 200,
            degraded_latency_ms: 150.0,
            degraded_cpu_pct: 80.0,
            critical_error_ratio: 0.10,
        }
    }
}

/// Anomaly detector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Maximum change of the smoothed chaos factor per tick.
    pub chaos_step: f64,

    /// Upper bound accepted for the chaos target.
    pub max_chaos: f64,

    /// Number of RPS samples used for the acceleration estimate.
    pub history_window: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            chaos_step: 2.5,
            max_chaos: 300.0,
            history_window: 10,
        }
    }
}

/// Chaos injection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChaosConfig {
    /// Mount the chaos middleware. The level itself is set at runtime.
    pub enabled: bool,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
            max_age_secs: 3600,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "admission_guard=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by the admin API. `None` leaves it open.
    pub api_key: Option<String>,
}
