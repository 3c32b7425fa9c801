pub mod aggregate;
pub mod key;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::BufferConfig;
use crate::metrics::BufferMetrics;
use crate::report::Report;
use crate::status::Status;

pub use self::aggregate::{Aggregate, AggregateValue};
pub use self::key::{AggregateKey, KeyRef, KeyView};

/// Buckets for a single subject.
type Buckets<S> = DashMap<AggregateKey<S>, Arc<AggregateValue>>;

/// Thread-safe aggregation buffer that coalesces health events per
/// (subject, name, status) triple.
///
/// Two levels of `DashMap`: subject to buckets, then (name, status) to a
/// shared [`AggregateValue`]. Both levels create entries through the entry
/// API, so concurrent first inserts for the same triple converge on one
/// bucket. Each subject's map sits behind an `Arc`, so an insert never holds
/// an outer and an inner shard guard at the same time.
///
/// Enumeration is weakly consistent: subjects are collected first, then each
/// subject's buckets are read one at a time while inserts continue.
pub struct Buffer<S = Status> {
    content: DashMap<String, Arc<Buckets<S>>>,
    clock: Arc<dyn Clock>,
    bucket_capacity: usize,
    metrics: Option<Arc<BufferMetrics>>,
}

impl<S> fmt::Debug for Buffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("subjects", &self.content.len())
            .field("bucket_capacity", &self.bucket_capacity)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl<S> Buffer<S>
where
    S: Copy + Eq + Hash,
{
    /// Creates an empty buffer timestamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty buffer timestamped by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_config(&BufferConfig::default(), clock)
    }

    /// Creates an empty buffer with both map levels sized from `cfg`.
    pub fn from_config(cfg: &BufferConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            content: DashMap::with_capacity(cfg.subject_capacity),
            clock,
            bucket_capacity: cfg.bucket_capacity,
            metrics: None,
        }
    }

    /// Attaches Prometheus instrumentation.
    pub fn with_metrics(mut self, metrics: Arc<BufferMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Records one event for `(subject, name, status)`.
    ///
    /// The first event for a triple creates its bucket with `score`, a count
    /// of 1, and `first == last == now`. Later events bump the count and move
    /// `last` forward; `score` and `first` stay as created.
    ///
    /// Returns the bucket itself, shared with the buffer.
    pub fn insert(&self, subject: &str, name: &str, status: S, score: f32) -> Arc<AggregateValue> {
        let buckets = self.buckets_for(subject);
        let now = self.clock.now_millis();
        let lookup = KeyRef::new(name, status);

        if let Some(existing) = buckets.get(&lookup as &dyn KeyView<S>) {
            existing.touch(now);
            if let Some(m) = &self.metrics {
                m.record_updated();
            }
            return Arc::clone(existing.value());
        }

        let value = match buckets.entry(AggregateKey::new(name, status)) {
            // Lost the creation race to another producer.
            Entry::Occupied(entry) => {
                let value = Arc::clone(entry.get());
                drop(entry);
                value.touch(now);
                if let Some(m) = &self.metrics {
                    m.record_updated();
                }
                value
            }
            Entry::Vacant(entry) => {
                let value = Arc::new(AggregateValue::new(score, now));
                entry.insert(Arc::clone(&value));
                if let Some(m) = &self.metrics {
                    m.record_created();
                }
                debug!(subject, name, first = now, "aggregation bucket created");
                value
            }
        };

        value
    }

    /// Returns the bucket map for `subject`, creating it if absent.
    fn buckets_for(&self, subject: &str) -> Arc<Buckets<S>> {
        if let Some(buckets) = self.content.get(subject) {
            return Arc::clone(buckets.value());
        }

        let buckets = self
            .content
            .entry(subject.to_string())
            .or_insert_with(|| {
                if let Some(m) = &self.metrics {
                    m.record_subject();
                }
                debug!(subject, "subject added");
                Arc::new(DashMap::with_capacity(self.bucket_capacity))
            });

        Arc::clone(buckets.value())
    }

    /// Looks up a bucket without modifying it.
    pub fn get(&self, subject: &str, name: &str, status: S) -> Option<Arc<AggregateValue>> {
        let buckets = self
            .content
            .get(subject)
            .map(|b| Arc::clone(b.value()))?;

        let lookup = KeyRef::new(name, status);
        buckets
            .get(&lookup as &dyn KeyView<S>)
            .map(|v| Arc::clone(v.value()))
    }

    /// Returns the identifiers of all subjects seen so far.
    pub fn subjects(&self) -> Vec<String> {
        self.content.iter().map(|e| e.key().clone()).collect()
    }

    /// Materializes the records for one subject.
    pub fn aggregates_for(&self, subject: &str) -> Vec<Aggregate<S>> {
        let Some(buckets) = self.content.get(subject).map(|b| Arc::clone(b.value())) else {
            return Vec::new();
        };

        collect_subject(subject, &buckets)
    }

    /// Materializes the records for every subject.
    pub fn aggregates(&self) -> Vec<Aggregate<S>> {
        // Release the outer guards before walking each subject.
        let subjects: Vec<(String, Arc<Buckets<S>>)> = self
            .content
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        subjects
            .iter()
            .flat_map(|(subject, buckets)| collect_subject(subject, buckets))
            .collect()
    }

    /// Number of subjects held.
    pub fn subject_count(&self) -> usize {
        self.content.len()
    }

    /// Number of buckets held across all subjects.
    pub fn bucket_count(&self) -> usize {
        self.content.iter().map(|e| e.value().len()).sum()
    }

    /// Whether no event has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl Buffer<Status> {
    /// Inserts every metric of `report` under the report's subject.
    /// Returns the number of inserts performed.
    pub fn insert_report(&self, report: &Report) -> usize {
        for (name, metric) in &report.metrics {
            self.insert(&report.subject, name, metric.status, metric.score);
        }

        if let Some(m) = &self.metrics {
            m.reports_ingested.inc();
        }

        report.metrics.len()
    }
}

impl<S> Default for Buffer<S>
where
    S: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

fn collect_subject<S: Copy + Eq + Hash>(subject: &str, buckets: &Buckets<S>) -> Vec<Aggregate<S>> {
    buckets
        .iter()
        .map(|e| Aggregate::from_value(subject, &e.key().name, e.key().status, e.value()))
        .collect()
}
