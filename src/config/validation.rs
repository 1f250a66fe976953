//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. Every violation is reported, not just the first.

use std::net::SocketAddr;

use crate::config::schema::GuardConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is not a valid socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be a finite, non-negative number")]
    Negative { field: &'static str },

    #[error("concurrency.min_limit ({min}) must not exceed concurrency.max_limit ({max})")]
    InvertedBounds { min: usize, max: usize },

    #[error("telemetry.critical_error_ratio must be within [0, 1], got {0}")]
    RatioOutOfRange(f64),
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "listener.request_timeout_secs",
        });
    }

    let rl = &config.rate_limit;
    if !(rl.requests_per_second.is_finite() && rl.requests_per_second > 0.0) {
        errors.push(ValidationError::NotPositive {
            field: "rate_limit.requests_per_second",
        });
    }
    check_non_negative(&mut errors, "rate_limit.burst_size", rl.burst_size);

    let cc = &config.concurrency;
    if cc.min_limit == 0 {
        errors.push(ValidationError::NotPositive {
            field: "concurrency.min_limit",
        });
    }
    if cc.min_limit > cc.max_limit {
        errors.push(ValidationError::InvertedBounds {
            min: cc.min_limit,
            max: cc.max_limit,
        });
    }
    if cc.target_latency_ms == 0 {
        errors.push(ValidationError::NotPositive {
            field: "concurrency.target_latency_ms",
        });
    }

    let tc = &config.telemetry;
    if tc.rollup_interval_ms == 0 {
        errors.push(ValidationError::NotPositive {
            field: "telemetry.rollup_interval_ms",
        });
    }
    if tc.history_capacity == 0 {
        errors.push(ValidationError::NotPositive {
            field: "telemetry.history_capacity",
        });
    }
    check_non_negative(&mut errors, "telemetry.degraded_latency_ms", tc.degraded_latency_ms);
    check_non_negative(&mut errors, "telemetry.degraded_cpu_pct", tc.degraded_cpu_pct);
    if !(0.0..=1.0).contains(&tc.critical_error_ratio) {
        errors.push(ValidationError::RatioOutOfRange(tc.critical_error_ratio));
    }

    let ac = &config.anomaly;
    if !(ac.chaos_step.is_finite() && ac.chaos_step > 0.0) {
        errors.push(ValidationError::NotPositive {
            field: "anomaly.chaos_step",
        });
    }
    check_non_negative(&mut errors, "anomaly.max_chaos", ac.max_chaos);
    if ac.history_window == 0 {
        errors.push(ValidationError::NotPositive {
            field: "anomaly.history_window",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_non_negative(errors: &mut Vec<ValidationError>, field: &'static str, value: f64) {
    if !(value.is_finite() && value >= 0.0) {
        errors.push(ValidationError::Negative { field });
    }
}
