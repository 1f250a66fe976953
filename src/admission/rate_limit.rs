//! Token bucket rate limiter.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::error::Error;

/// Mutable bucket state, always accessed under the limiter's mutex.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        // A caller holding an older instant must not rewind the clock.
        if now > self.last_update {
            self.last_update = now;
        }
    }
}

/// A process-wide token bucket.
///
/// Tokens accumulate at `rate` per second up to `capacity` and each admitted
/// call consumes one. The bucket starts full.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter refilling at `rate` tokens/second with a burst of `capacity`.
    pub fn new(rate: f64, capacity: f64) -> Result<Self, Error> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidRate(rate));
        }
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        Ok(Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        })
    }

    /// Try to take one token. Returns `false` when the bucket is empty.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Same as [`allow`](Self::allow) with an explicit clock reading.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(now, self.rate, self.capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Token balance as of the last refill.
    pub fn available(&self) -> f64 {
        self.bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
