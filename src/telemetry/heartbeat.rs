//! Periodic rollup driver.
//!
//! # Responsibilities
//! - Tick the collector rollup on a fixed interval
//! - Feed the rollup output and the pressure signal into the anomaly detector
//! - Record each combined snapshot in the temporal history
//! - Publish gauges and log health transitions

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::admission::ConcurrencyGovernor;
use crate::observability::metrics;
use crate::telemetry::anomaly::{AnomalyDetector, AnomalyStats};
use crate::telemetry::collector::{HealthStatus, MetricsSnapshot, TelemetryCollector};
use crate::telemetry::history::TemporalHistory;

/// External load signal fed into the risk score.
pub trait PressureSource: Send + Sync {
    fn pressure(&self) -> f64;
}

impl<F> PressureSource for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn pressure(&self) -> f64 {
        self()
    }
}

/// Governor utilisation (`inflight / limit`) as pressure.
impl PressureSource for ConcurrencyGovernor {
    fn pressure(&self) -> f64 {
        self.utilization()
    }
}

/// Everything one tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SystemSnapshot {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    #[serde(flatten)]
    pub anomaly: AnomalyStats,
    pub concurrency_limit: Option<usize>,
    pub pressure: f64,
}

pub struct Heartbeat {
    collector: Arc<TelemetryCollector>,
    anomaly: Arc<AnomalyDetector>,
    history: Arc<TemporalHistory<SystemSnapshot>>,
    governor: Option<Arc<ConcurrencyGovernor>>,
    pressure: Option<Arc<dyn PressureSource>>,
    interval: Duration,
    latest: ArcSwap<SystemSnapshot>,
}

impl Heartbeat {
    pub fn new(
        collector: Arc<TelemetryCollector>,
        anomaly: Arc<AnomalyDetector>,
        history: Arc<TemporalHistory<SystemSnapshot>>,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            anomaly,
            history,
            governor: None,
            pressure: None,
            interval,
            latest: ArcSwap::from_pointee(SystemSnapshot::default()),
        }
    }

    /// Report the governor's ceiling in every snapshot and, unless another
    /// source is set, use its utilisation as the pressure signal.
    pub fn with_governor(mut self, governor: Arc<ConcurrencyGovernor>) -> Self {
        self.governor = Some(governor);
        self
    }

    /// Override the pressure signal fed into the anomaly detector.
    pub fn with_pressure(mut self, source: Arc<dyn PressureSource>) -> Self {
        self.pressure = Some(source);
        self
    }

    /// Time between ticks of [`run`](Self::run).
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Latest combined snapshot.
    pub fn latest(&self) -> Arc<SystemSnapshot> {
        self.latest.load_full()
    }

    pub fn tick(&self) -> Option<SystemSnapshot> {
        self.tick_at(Instant::now(), unix_millis())
    }

    /// Run one rollup as of `now`, stamping the history entry with `timestamp_ms`.
    ///
    /// Returns `None` when the collector skipped the tick.
    pub fn tick_at(&self, now: Instant, timestamp_ms: u64) -> Option<SystemSnapshot> {
        let previous = self.latest.load().metrics.health_status;
        let rollup = self.collector.rollup_at(now)?;

        let pressure = self.pressure();
        self.anomaly.update(rollup.requests_per_second, pressure);

        let snapshot = SystemSnapshot {
            metrics: rollup,
            anomaly: self.anomaly.stats(),
            concurrency_limit: self.governor.as_ref().map(|g| g.limit()),
            pressure,
        };

        self.latest.store(Arc::new(snapshot));
        self.history.push(timestamp_ms, snapshot);
        metrics::record_rollup(&snapshot);
        log_transition(previous, rollup.health_status, &snapshot);

        Some(snapshot)
    }

    fn pressure(&self) -> f64 {
        match (&self.pressure, &self.governor) {
            (Some(source), _) => source.pressure(),
            (None, Some(governor)) => governor.utilization(),
            (None, None) => 0.0,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Telemetry heartbeat starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Telemetry heartbeat received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn log_transition(previous: HealthStatus, current: HealthStatus, snapshot: &SystemSnapshot) {
    if previous == current {
        return;
    }
    match current {
        HealthStatus::Healthy => tracing::info!(
            from = %previous,
            rps = snapshot.metrics.requests_per_second,
            "Health recovered"
        ),
        _ => tracing::warn!(
            from = %previous,
            to = %current,
            rps = snapshot.metrics.requests_per_second,
            latency_ms = snapshot.metrics.average_latency_ms,
            errors = snapshot.metrics.error_count,
            "Health degraded"
        ),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnomalyConfig;
    use crate::telemetry::collector::HealthThresholds;

    struct Fixture {
        collector: Arc<TelemetryCollector>,
        anomaly: Arc<AnomalyDetector>,
        history: Arc<TemporalHistory<SystemSnapshot>>,
        heartbeat: Heartbeat,
    }

    fn fixture() -> Fixture {
        let collector = Arc::new(TelemetryCollector::new(HealthThresholds::default()));
        let anomaly = Arc::new(AnomalyDetector::new(&AnomalyConfig::default()));
        let history = Arc::new(TemporalHistory::new(8).unwrap());
        let heartbeat = Heartbeat::new(
            collector.clone(),
            anomaly.clone(),
            history.clone(),
            Duration::from_millis(250),
        );
        Fixture {
            collector,
            anomaly,
            history,
            heartbeat,
        }
    }

    #[test]
    fn test_tick_feeds_detector_and_history() {
        let f = fixture();
        let start = Instant::now();
        for _ in 0..10 {
            f.collector.record_request(Duration::from_millis(5), false);
        }

        let snap = f.heartbeat.tick_at(start + Duration::from_secs(1), 1_000).unwrap();
        assert_eq!(snap.metrics.total_requests, 10);
        assert!(f.anomaly.baseline_rps() > 0.0);
        assert_eq!(*f.heartbeat.latest(), snap);

        let history = f.history.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp_ms, 1_000);
        assert_eq!(history[0].metrics, snap);
    }

    #[test]
    fn test_skipped_rollup_records_nothing() {
        let f = fixture();
        let at = Instant::now() + Duration::from_secs(1);
        assert!(f.heartbeat.tick_at(at, 1).is_some());
        assert!(f.heartbeat.tick_at(at, 2).is_none());
        assert_eq!(f.history.len(), 1);
    }

    #[test]
    fn test_pressure_and_governor_are_reported() {
        let f = fixture();
        let governor = Arc::new(ConcurrencyGovernor::new(4, 8, Duration::from_millis(50)).unwrap());
        let heartbeat = f
            .heartbeat
            .with_governor(governor.clone())
            .with_pressure(Arc::new(|| 10.0));

        let snap = heartbeat.tick_at(Instant::now() + Duration::from_secs(1), 1).unwrap();
        assert_eq!(snap.concurrency_limit, Some(4));
        assert_eq!(snap.pressure, 10.0);
        assert!((snap.anomaly.risk_factor - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_chaos_target_is_approached_per_tick() {
        let f = fixture();
        f.anomaly.set_chaos(5.0);
        let start = Instant::now();
        let first = f.heartbeat.tick_at(start + Duration::from_secs(1), 1).unwrap();
        let second = f.heartbeat.tick_at(start + Duration::from_secs(2), 2).unwrap();
        assert_eq!(first.anomaly.chaos_factor, 2.5);
        assert_eq!(second.anomaly.chaos_factor, 5.0);
    }

    #[test]
    fn test_governor_is_default_pressure_source() {
        let f = fixture();
        let governor = Arc::new(ConcurrencyGovernor::new(4, 8, Duration::from_millis(50)).unwrap());
        assert!(governor.acquire());
        let heartbeat = f.heartbeat.with_governor(governor);

        let snap = heartbeat.tick_at(Instant::now() + Duration::from_secs(1), 1).unwrap();
        assert!((snap.pressure - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_no_governor_means_no_pressure() {
        let f = fixture();
        let snap = f.heartbeat.tick_at(Instant::now() + Duration::from_secs(1), 1).unwrap();
        assert_eq!(snap.pressure, 0.0);
        assert_eq!(snap.concurrency_limit, None);
    }

    #[test]
    fn test_governor_utilization_as_pressure() {
        let governor = ConcurrencyGovernor::new(4, 8, Duration::from_millis(50)).unwrap();
        assert!(governor.acquire());
        assert!((PressureSource::pressure(&governor) - 0.25).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let f = fixture();
        let heartbeat = Arc::new(f.heartbeat);
        let (tx, rx) = broadcast::channel(1);

        let task = tokio::spawn(heartbeat.clone().run(rx));
        time::sleep(Duration::from_millis(600)).await;
        tx.send(()).unwrap();
        task.await.unwrap();

        assert!(!f.history.is_empty());
    }
}
