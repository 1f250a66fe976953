//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admission_requests_total` (counter): requests by outcome, including `cancelled`
//! - `admission_request_duration_seconds` (histogram): handler latency
//! - `admission_rejections_total` (counter): denials by reason
//! - `admission_concurrency_limit` (gauge): current governor ceiling
//! - `admission_rps`, `admission_latency_ms`, `admission_active_requests`,
//!   `admission_cpu_proxy_pct`, `admission_health` (gauges): last rollup
//! - `admission_anomaly_score`, `admission_risk_factor`, `admission_chaos_factor`
//!   (gauges): last detector output

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::telemetry::SystemSnapshot;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

fn outcome(status: u16) -> &'static str {
    match status {
        500.. => "server_error",
        400..=499 => "client_error",
        _ => "success",
    }
}

pub fn record_request(status: u16, elapsed: Duration) {
    counter!("admission_requests_total", "outcome" => outcome(status)).increment(1);
    histogram!("admission_request_duration_seconds").record(elapsed.as_secs_f64());
}

/// A request abandoned before producing a response (timeout or disconnect).
pub fn record_cancelled(elapsed: Duration) {
    counter!("admission_requests_total", "outcome" => "cancelled").increment(1);
    histogram!("admission_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("admission_rejections_total", "reason" => reason).increment(1);
}

pub fn record_concurrency_limit(limit: usize) {
    gauge!("admission_concurrency_limit").set(limit as f64);
}

pub fn record_rollup(snapshot: &SystemSnapshot) {
    let m = &snapshot.metrics;
    gauge!("admission_rps").set(m.requests_per_second);
    gauge!("admission_latency_ms").set(m.average_latency_ms);
    gauge!("admission_active_requests").set(m.active_requests as f64);
    gauge!("admission_cpu_proxy_pct").set(m.cpu_proxy_pct);
    gauge!("admission_health").set(m.health_status.as_gauge());

    let a = &snapshot.anomaly;
    gauge!("admission_anomaly_score").set(a.anomaly_score);
    gauge!("admission_risk_factor").set(a.risk_factor);
    gauge!("admission_chaos_factor").set(a.chaos_factor);

    if let Some(limit) = snapshot.concurrency_limit {
        record_concurrency_limit(limit);
    }
}
