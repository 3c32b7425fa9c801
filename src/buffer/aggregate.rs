use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running tally for one (subject, name, status) bucket.
///
/// `score` and `first` are fixed at creation. `count` and `last` are atomic
/// and only ever grow, so concurrent producers never lose an update.
#[derive(Debug)]
pub struct AggregateValue {
    score: f32,
    count: AtomicU64,
    first: u64,
    last: AtomicU64,
}

impl AggregateValue {
    /// Creates a bucket for its first occurrence at `now_ms`.
    pub fn new(score: f32, now_ms: u64) -> Self {
        Self {
            score,
            count: AtomicU64::new(1),
            first: now_ms,
            last: AtomicU64::new(now_ms),
        }
    }

    /// Records one more occurrence at `now_ms`.
    ///
    /// `last` takes the maximum of its current value and `now_ms`, which keeps
    /// it at or above `first` when the clock steps backwards.
    pub fn touch(&self, now_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last.fetch_max(now_ms, Ordering::Relaxed);
    }

    /// Score captured when the bucket was created.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Number of occurrences recorded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Timestamp of the first occurrence in milliseconds.
    pub fn first(&self) -> u64 {
        self.first
    }

    /// Timestamp of the latest occurrence in milliseconds.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// Read-only record materialized from a bucket for consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate<S> {
    pub subject: String,
    pub name: String,
    pub status: S,
    pub score: f32,
    pub count: u64,
    pub first: u64,
    pub last: u64,
}

impl<S> Aggregate<S> {
    /// Builds a record from a bucket's current state.
    ///
    /// `count` and `last` are read with separate loads, so a record taken
    /// during concurrent inserts may pair a count with a slightly older or
    /// newer `last`.
    pub fn from_value(subject: &str, name: &str, status: S, value: &AggregateValue) -> Self {
        Self {
            subject: subject.to_string(),
            name: name.to_string(),
            status,
            score: value.score(),
            count: value.count(),
            first: value.first(),
            last: value.last(),
        }
    }
}
