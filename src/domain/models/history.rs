//! Bounded FIFO sample histories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of samples retained per stream.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// One timestamped observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample<T> {
    pub at: DateTime<Utc>,
    pub value: T,
}

/// Fixed-capacity history; the oldest sample is evicted once full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryBuffer<T> {
    capacity: usize,
    samples: VecDeque<Sample<T>>,
}

impl<T> HistoryBuffer<T> {
    /// A zero capacity is bumped to one so `push` always retains the newest sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T, at: DateTime<Utc>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { at, value });
    }

    /// Samples oldest → newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Sample<T>> + DoubleEndedIterator {
        self.samples.iter()
    }

    /// Sample values oldest → newest.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &T> + DoubleEndedIterator {
        self.samples.iter().map(|sample| &sample.value)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples taken at or after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.samples.iter().filter(|sample| sample.at >= since).count()
    }

    /// Index-based split point: the first half holds `ceil(len / 2)` samples.
    pub fn midpoint(&self) -> usize {
        self.samples.len().div_ceil(2)
    }

    /// Values in `[0, midpoint)` and `[midpoint, len)`.
    pub fn halves(&self) -> (impl Iterator<Item = &T>, impl Iterator<Item = &T>) {
        let mid = self.midpoint();
        (self.values().take(mid), self.values().skip(mid))
    }
}

impl<T: Clone> HistoryBuffer<T> {
    pub fn to_vec(&self) -> Vec<Sample<T>> {
        self.samples.iter().cloned().collect()
    }
}

impl<T> Default for HistoryBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
