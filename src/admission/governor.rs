//! Adaptive concurrency governor.
//!
//! Admission is bounded by a ceiling that moves by one step per completed
//! request: completions at or under the target latency raise it, slower
//! completions lower it, always within `[min_limit, max_limit]`.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::observability::metrics;

#[derive(Debug)]
pub struct ConcurrencyGovernor {
    limit: AtomicUsize,
    inflight: AtomicUsize,
    min_limit: usize,
    max_limit: usize,
    target_latency: Duration,
}

impl ConcurrencyGovernor {
    /// Create a governor whose ceiling starts at `min_limit`.
    pub fn new(min_limit: usize, max_limit: usize, target_latency: Duration) -> Result<Self, Error> {
        if min_limit == 0 || min_limit > max_limit {
            return Err(Error::InvalidConcurrencyBounds {
                min: min_limit,
                max: max_limit,
            });
        }
        if target_latency.is_zero() {
            return Err(Error::InvalidTargetLatency(target_latency));
        }

        Ok(Self {
            limit: AtomicUsize::new(min_limit),
            inflight: AtomicUsize::new(0),
            min_limit,
            max_limit,
            target_latency,
        })
    }

    /// Try to admit one request. Every `true` must be paired with exactly one
    /// [`release`](Self::release).
    pub fn acquire(&self) -> bool {
        let mut prev = self.inflight.load(Ordering::Acquire);
        loop {
            if prev >= self.limit.load(Ordering::Acquire) {
                return false;
            }
            match self.inflight.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Release a slot and feed the observed duration back into the ceiling.
    pub fn release(&self, observed: Duration) {
        let released = self
            .inflight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if released.is_err() {
            tracing::warn!("Concurrency release without a matching acquire");
            return;
        }

        let current = self.limit.load(Ordering::Acquire);
        let next = if observed <= self.target_latency {
            (current < self.max_limit).then(|| current + 1)
        } else {
            (current > self.min_limit).then(|| current - 1)
        };

        // One attempt only: losing the race means another completion already
        // moved the ceiling from the value this observation was based on.
        if let Some(next) = next {
            if self
                .limit
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                metrics::record_concurrency_limit(next);
            }
        }
    }

    /// Admit one request and return a guard that releases it on drop.
    pub fn try_acquire_permit(self: &Arc<Self>) -> Option<ConcurrencyPermit> {
        self.acquire().then(|| ConcurrencyPermit {
            governor: self.clone(),
            started: Instant::now(),
        })
    }

    /// Current admission ceiling.
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Requests admitted and not yet released.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Lower bound of the ceiling.
    pub fn min_limit(&self) -> usize {
        self.min_limit
    }

    /// Upper bound of the ceiling.
    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    /// Completions at or under this latency raise the ceiling.
    pub fn target_latency(&self) -> Duration {
        self.target_latency
    }

    /// Fraction of the current ceiling in use.
    pub fn utilization(&self) -> f64 {
        let limit = self.limit();
        if limit == 0 {
            return 0.0;
        }
        self.inflight() as f64 / limit as f64
    }
}

/// A RAII guard for one admitted request.
///
/// Dropping the permit releases the slot with the time elapsed since admission,
/// so early returns, errors and cancelled futures all report exactly once.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    governor: Arc<ConcurrencyGovernor>,
    started: Instant,
}

impl ConcurrencyPermit {
    /// Time since the request was admitted.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Deref for ConcurrencyPermit {
    type Target = ConcurrencyGovernor;
    fn deref(&self) -> &Self::Target {
        &self.governor
    }
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.governor.release(self.started.elapsed());
    }
}
