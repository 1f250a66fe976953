//! Baseline learning, chaos smoothing and predictive risk.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::config::AnomalyConfig;

/// Weight of the previous baseline in the EMA update.
const BASELINE_DECAY: f64 = 0.95;

const ACCELERATION_WEIGHT: f64 = 0.5;
const PRESSURE_WEIGHT: f64 = 0.3;
const CHAOS_WEIGHT: f64 = 0.2;

/// Consistent view of the detector's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AnomalyStats {
    /// Relative deviation of the current rate from the baseline, in percent.
    pub anomaly_score: f64,
    pub risk_factor: f64,
    /// Smoothed chaos level currently applied.
    pub chaos_factor: f64,
}

#[derive(Debug)]
struct DetectorState {
    baseline_rps: f64,
    anomaly_score: f64,
    risk_factor: f64,
    chaos_factor: f64,
    target_chaos: f64,
    history: VecDeque<f64>,
}

/// Exponential-moving-average anomaly detector.
///
/// Fed once per rollup tick. All state lives behind one read/write lock so
/// [`stats`](Self::stats) always returns a triple from the same tick.
#[derive(Debug)]
pub struct AnomalyDetector {
    chaos_step: f64,
    max_chaos: f64,
    window: usize,
    state: RwLock<DetectorState>,
}

impl AnomalyDetector {
    pub fn new(config: &AnomalyConfig) -> Self {
        let window = config.history_window.max(1);
        Self {
            chaos_step: config.chaos_step,
            max_chaos: config.max_chaos,
            window,
            state: RwLock::new(DetectorState {
                baseline_rps: 0.0,
                anomaly_score: 0.0,
                risk_factor: 0.0,
                chaos_factor: 0.0,
                target_chaos: 0.0,
                history: VecDeque::with_capacity(window),
            }),
        }
    }

    /// Fold one rollup sample into the detector.
    pub fn update(&self, current_rps: f64, pressure: f64) {
        if !current_rps.is_finite() || !pressure.is_finite() {
            tracing::debug!(current_rps, pressure, "Skipping anomaly tick with non-finite input");
            return;
        }

        let mut s = self.state.write().unwrap_or_else(PoisonError::into_inner);

        // The first sample seeds the baseline exactly.
        s.baseline_rps = if s.baseline_rps == 0.0 {
            current_rps
        } else {
            BASELINE_DECAY * s.baseline_rps + (1.0 - BASELINE_DECAY) * current_rps
        };

        s.chaos_factor = step_towards(s.chaos_factor, s.target_chaos, self.chaos_step);

        s.anomaly_score = 100.0 * (current_rps - s.baseline_rps).abs() / (s.baseline_rps + 1.0);

        if s.history.len() == self.window {
            s.history.pop_front();
        }
        s.history.push_back(current_rps);

        let acceleration = match (s.history.front(), s.history.back()) {
            (Some(first), Some(last)) if s.history.len() >= 2 => last - first,
            _ => 0.0,
        };

        s.risk_factor = (ACCELERATION_WEIGHT * acceleration
            + PRESSURE_WEIGHT * pressure
            + CHAOS_WEIGHT * s.chaos_factor)
            .max(0.0);
    }

    /// Set the chaos level the smoothed factor moves towards.
    pub fn set_chaos(&self, target: f64) {
        if !target.is_finite() {
            tracing::warn!(target, "Ignoring non-finite chaos target");
            return;
        }
        let target = target.clamp(0.0, self.max_chaos);
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .target_chaos = target;
    }

    pub fn target_chaos(&self) -> f64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .target_chaos
    }

    pub fn baseline_rps(&self) -> f64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .baseline_rps
    }

    pub fn stats(&self) -> AnomalyStats {
        let s = self.state.read().unwrap_or_else(PoisonError::into_inner);
        AnomalyStats {
            anomaly_score: s.anomaly_score,
            risk_factor: s.risk_factor,
            chaos_factor: s.chaos_factor,
        }
    }
}

/// Move `current` towards `target` by at most `step`, never crossing it.
fn step_towards(current: f64, target: f64, step: f64) -> f64 {
    if current < target {
        (current + step).min(target)
    } else if current > target {
        (current - step).max(target)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(&AnomalyConfig::default())
    }

    #[test]
    fn test_first_sample_seeds_baseline() {
        let d = detector();
        d.update(120.0, 0.0);
        assert_eq!(d.baseline_rps(), 120.0);
        assert_eq!(d.stats().anomaly_score, 0.0);
    }

    #[test]
    fn test_baseline_follows_ema() {
        let d = detector();
        d.update(100.0, 0.0);
        d.update(200.0, 0.0);

        let baseline = 0.95 * 100.0 + 0.05 * 200.0;
        assert!((d.baseline_rps() - baseline).abs() < 1e-9);

        let expected = 100.0 * (200.0 - baseline) / (baseline + 1.0);
        assert!((d.stats().anomaly_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_steady_rate_has_zero_anomaly() {
        let d = detector();
        for _ in 0..5 {
            d.update(40.0, 0.0);
        }
        assert_eq!(d.stats().anomaly_score, 0.0);
    }

    #[test]
    fn test_zero_traffic_does_not_divide_by_zero() {
        let d = detector();
        d.update(0.0, 0.0);
        d.update(0.0, 0.0);
        let stats = d.stats();
        assert_eq!(stats.anomaly_score, 0.0);
        assert!(stats.risk_factor.is_finite());
    }

    #[test]
    fn test_chaos_moves_in_bounded_steps() {
        let d = detector();
        d.set_chaos(10.0);

        let mut previous = 0.0;
        for _ in 0..10 {
            d.update(1.0, 0.0);
            let chaos = d.stats().chaos_factor;
            assert!(chaos >= previous, "chaos must move monotonically");
            assert!(chaos - previous <= 2.5 + 1e-9);
            assert!(chaos <= 10.0, "chaos must never overshoot");
            previous = chaos;
        }
        assert_eq!(previous, 10.0);

        d.set_chaos(4.0);
        d.update(1.0, 0.0);
        assert_eq!(d.stats().chaos_factor, 7.5);
        d.update(1.0, 0.0);
        d.update(1.0, 0.0);
        assert_eq!(d.stats().chaos_factor, 4.0);
    }

    #[test]
    fn test_set_chaos_clamps_and_ignores_nan() {
        let d = detector();
        d.set_chaos(1_000.0);
        assert_eq!(d.target_chaos(), 300.0);
        d.set_chaos(-5.0);
        assert_eq!(d.target_chaos(), 0.0);
        d.set_chaos(f64::NAN);
        assert_eq!(d.target_chaos(), 0.0);
    }

    #[test]
    fn test_risk_combines_acceleration_pressure_and_chaos() {
        let d = detector();
        d.set_chaos(2.5);
        d.update(10.0, 0.0);
        d.update(30.0, 4.0);

        // acceleration 20, pressure 4, chaos 2.5
        let expected = 0.5 * 20.0 + 0.3 * 4.0 + 0.2 * 2.5;
        assert!((d.stats().risk_factor - expected).abs() < 1e-9);
    }

    #[test]
    fn test_risk_is_floored_at_zero() {
        let d = detector();
        d.update(100.0, 0.0);
        d.update(10.0, 0.0);
        assert_eq!(d.stats().risk_factor, 0.0);
    }

    #[test]
    fn test_history_window_evicts_oldest() {
        let d = detector();
        for rps in 0..15 {
            d.update(rps as f64, 0.0);
        }
        // Window holds samples 5..=14, so acceleration is 9.
        assert!((d.stats().risk_factor - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_tick_is_skipped() {
        let d = detector();
        d.update(50.0, 0.0);
        let before = d.stats();
        d.update(f64::INFINITY, 0.0);
        d.update(50.0, f64::NAN);
        assert_eq!(d.stats(), before);
    }
}
