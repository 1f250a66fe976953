//! Fixed-capacity ring buffer of timestamped snapshots.

use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::error::Error;

/// One recorded moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalSnapshot<T> {
    /// Wall-clock time of the rollup, unix milliseconds.
    #[serde(rename = "ts")]
    pub timestamp_ms: u64,
    pub metrics: T,
}

#[derive(Debug)]
struct Ring<T> {
    slots: Vec<Option<TemporalSnapshot<T>>>,
    head: usize,
}

/// Circular history of snapshots.
///
/// Slots are allocated once at construction and overwritten in place; the
/// buffer never grows. Unpopulated slots stay `None` until the first wrap.
#[derive(Debug)]
pub struct TemporalHistory<T> {
    capacity: usize,
    ring: RwLock<Ring<T>>,
}

impl<T: Clone> TemporalHistory<T> {
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidHistoryCapacity);
        }

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Ok(Self {
            capacity,
            ring: RwLock::new(Ring { slots, head: 0 }),
        })
    }

    /// Overwrite the oldest slot.
    pub fn push(&self, timestamp_ms: u64, metrics: T) {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let head = ring.head;
        ring.slots[head] = Some(TemporalSnapshot { timestamp_ms, metrics });
        ring.head = (head + 1) % self.capacity;
    }

    /// Populated snapshots, oldest first.
    pub fn history(&self) -> Vec<TemporalSnapshot<T>> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let (newer, older) = ring.slots.split_at(ring.head);
        older
            .iter()
            .chain(newer)
            .flatten()
            .cloned()
            .collect()
    }

    /// The most recent `limit` snapshots, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<TemporalSnapshot<T>> {
        let mut all = self.history();
        let skip = all.len().saturating_sub(limit);
        all.drain(..skip);
        all
    }

    pub fn len(&self) -> usize {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        ring.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(h: &TemporalHistory<u32>) -> Vec<u64> {
        h.history().iter().map(|s| s.timestamp_ms).collect()
    }

    #[test]
    fn test_partial_buffer_in_push_order() {
        let h = TemporalHistory::new(5).unwrap();
        assert!(h.is_empty());
        for i in 1..=3u32 {
            h.push(u64::from(i) * 10, i);
        }
        assert_eq!(timestamps(&h), vec![10, 20, 30]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_wraparound_keeps_capacity_newest() {
        let capacity = 4;
        let h = TemporalHistory::new(capacity).unwrap();
        let k = 3;
        for i in 1..=(capacity + k) as u32 {
            h.push(u64::from(i), i);
        }

        let history = h.history();
        assert_eq!(history.len(), capacity);
        // Oldest retained entry is the (k+1)-th pushed.
        assert_eq!(history[0].metrics, (k + 1) as u32);
        assert_eq!(
            history.iter().map(|s| s.metrics).collect::<Vec<_>>(),
            vec![4, 5, 6, 7]
        );
    }

    #[test]
    fn test_exact_wrap_returns_in_order() {
        let h = TemporalHistory::new(3).unwrap();
        for i in 1..=3u32 {
            h.push(u64::from(i), i);
        }
        assert_eq!(timestamps(&h), vec![1, 2, 3]);
    }

    #[test]
    fn test_recent_returns_tail() {
        let h = TemporalHistory::new(10).unwrap();
        for i in 1..=6u32 {
            h.push(u64::from(i), i);
        }
        let tail: Vec<_> = h.recent(2).iter().map(|s| s.metrics).collect();
        assert_eq!(tail, vec![5, 6]);
        assert_eq!(h.recent(100).len(), 6);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(
            TemporalHistory::<u32>::new(0).unwrap_err(),
            Error::InvalidHistoryCapacity
        );
    }
}
