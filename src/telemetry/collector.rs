//! Request counters and periodic rollup into derived rates.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::TelemetryConfig;

/// Coarse health classification produced by each rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// Numeric form used for gauges (0 = healthy, 2 = critical).
    pub fn as_gauge(self) -> f64 {
        match self {
            HealthStatus::Healthy => 0.0,
            HealthStatus::Degraded => 1.0,
            HealthStatus::Critical => 2.0,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Thresholds for [`HealthStatus`] classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Mean latency above which the service is degraded.
    pub degraded_latency_ms: f64,
    /// CPU proxy percentage above which the service is degraded.
    pub degraded_cpu_pct: f64,
    /// Error ratio (0..=1) above which the service is critical.
    pub critical_error_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_latency_ms: 150.0,
            degraded_cpu_pct: 80.0,
            critical_error_ratio: 0.10,
        }
    }
}

impl From<&TelemetryConfig> for HealthThresholds {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            degraded_latency_ms: config.degraded_latency_ms,
            degraded_cpu_pct: config.degraded_cpu_pct,
            critical_error_ratio: config.critical_error_ratio,
        }
    }
}

impl HealthThresholds {
    /// Classify a rollup. Critical wins over degraded.
    pub fn classify(&self, average_latency_ms: f64, cpu_proxy_pct: f64, error_ratio: f64) -> HealthStatus {
        if error_ratio > self.critical_error_ratio {
            HealthStatus::Critical
        } else if average_latency_ms > self.degraded_latency_ms || cpu_proxy_pct > self.degraded_cpu_pct {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Derived statistics published by one rollup.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub active_requests: i64,
    pub requests_per_second: f64,
    /// Mean latency over the process lifetime, in milliseconds.
    pub average_latency_ms: f64,
    /// Load estimate derived from throughput and in-flight requests.
    pub cpu_proxy_pct: f64,
    pub uptime_seconds: f64,
    pub health_status: HealthStatus,
}

/// State owned by the rollup writer.
#[derive(Debug)]
struct RollupWindow {
    last_request_count: u64,
    last_check: Instant,
    average_latency_ms: f64,
}

/// Lock-free request counters with a periodically recomputed snapshot.
///
/// Requests only touch atomics. [`rollup_at`](Self::rollup_at) reads the
/// counters once, computes every derived field off-lock and publishes the
/// result through a single pointer swap, so readers never observe a
/// half-updated snapshot.
pub struct TelemetryCollector {
    total_requests: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_micros: AtomicU64,
    active_requests: AtomicI64,
    thresholds: HealthThresholds,
    started_at: Instant,
    window: Mutex<RollupWindow>,
    latest: ArcSwap<MetricsSnapshot>,
}

impl TelemetryCollector {
    pub fn new(thresholds: HealthThresholds) -> Self {
        let now = Instant::now();
        Self {
            total_requests: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_latency_micros: AtomicU64::new(0),
            active_requests: AtomicI64::new(0),
            thresholds,
            started_at: now,
            window: Mutex::new(RollupWindow {
                last_request_count: 0,
                last_check: now,
                average_latency_ms: 0.0,
            }),
            latest: ArcSwap::from_pointee(MetricsSnapshot::default()),
        }
    }

    /// Track one completed request.
    pub fn record_request(&self, duration: Duration, is_error: bool) {
        // `total_requests` is bumped before the outcome and latency counters;
        // the rollup loads them in the opposite order.
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        if is_error {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        } else {
            self.success_count.fetch_add(1, Ordering::SeqCst);
        }
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_micros.fetch_add(micros, Ordering::SeqCst);
    }

    /// Mark one request as in flight.
    pub fn inc_active(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark one in-flight request as finished.
    pub fn dec_active(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment the in-flight gauge and return a guard that decrements it.
    pub fn track_active(self: &Arc<Self>) -> ActiveRequestGuard {
        self.inc_active();
        ActiveRequestGuard {
            collector: self.clone(),
        }
    }

    /// Requests recorded since start-up.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    /// Requests currently in flight.
    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Thresholds used to classify health.
    pub fn thresholds(&self) -> HealthThresholds {
        self.thresholds
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<MetricsSnapshot> {
        self.latest.load_full()
    }

    /// Recompute derived statistics as of now.
    pub fn rollup(&self) -> Option<MetricsSnapshot> {
        self.rollup_at(Instant::now())
    }

    /// Recompute derived statistics as of `now`.
    ///
    /// Returns `None` and leaves the published snapshot untouched when no
    /// time has passed since the previous rollup.
    pub fn rollup_at(&self, now: Instant) -> Option<MetricsSnapshot> {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(window.last_check).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        // Everything bumped after `total_requests` is loaded before it, so
        // each outcome and latency read belongs to a request in `total`.
        let error_count = self.error_count.load(Ordering::SeqCst);
        let success_count = self.success_count.load(Ordering::SeqCst);
        let latency_micros = self.total_latency_micros.load(Ordering::SeqCst);
        let total = self.total_requests.load(Ordering::SeqCst);
        let active_requests = self.active_requests.load(Ordering::Relaxed);

        let delta = total.saturating_sub(window.last_request_count);
        let requests_per_second = delta as f64 / elapsed;

        if total > 0 {
            window.average_latency_ms = latency_micros as f64 / total as f64 / 1000.0;
        }
        let average_latency_ms = window.average_latency_ms;

        let cpu_proxy_pct =
            (requests_per_second * 0.5 + active_requests.max(0) as f64 * 0.1).min(99.9);

        let error_ratio = if total > 0 {
            error_count as f64 / total as f64
        } else {
            0.0
        };
        let health_status = self
            .thresholds
            .classify(average_latency_ms, cpu_proxy_pct, error_ratio);

        let snapshot = MetricsSnapshot {
            total_requests: total,
            success_count,
            error_count,
            active_requests,
            requests_per_second,
            average_latency_ms,
            cpu_proxy_pct,
            uptime_seconds: now.saturating_duration_since(self.started_at).as_secs_f64(),
            health_status,
        };

        window.last_request_count = total;
        window.last_check = now;
        self.latest.store(Arc::new(snapshot));

        Some(snapshot)
    }
}

impl fmt::Debug for TelemetryCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryCollector")
            .field("total_requests", &self.total_requests())
            .field("active_requests", &self.active_requests())
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

/// Keeps the in-flight gauge incremented for its lifetime.
#[derive(Debug)]
pub struct ActiveRequestGuard {
    collector: Arc<TelemetryCollector>,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.collector.dec_active();
    }
}
