use anyhow::{Context, Result};
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "deephealth";

/// Prometheus metrics for the aggregation buffer and report ingestion.
///
/// All metrics use the "deephealth" namespace.
pub struct BufferMetrics {
    registry: Registry,

    /// Inserts by outcome (created/updated).
    pub inserts: CounterVec,
    /// Number of subjects held by the buffer.
    pub subjects: Gauge,
    /// Number of buckets held by the buffer, across all subjects.
    pub buckets: Gauge,
    /// Reports accepted into the buffer.
    pub reports_ingested: Counter,
    /// Reports rejected during decoding, by reason.
    pub reports_rejected: CounterVec,
    /// Reports skipped because they were older than the staleness cutoff.
    pub reports_stale: Counter,
}

impl BufferMetrics {
    /// Creates a new metrics instance with all metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let inserts = CounterVec::new(
            Opts::new("inserts_total", "Total buffer inserts by outcome.")
                .namespace(NAMESPACE)
                .subsystem("buffer"),
            &["outcome"],
        )?;
        let subjects = Gauge::with_opts(
            Opts::new("subjects", "Number of subjects held by the buffer.")
                .namespace(NAMESPACE)
                .subsystem("buffer"),
        )?;
        let buckets = Gauge::with_opts(
            Opts::new("buckets", "Number of aggregation buckets held by the buffer.")
                .namespace(NAMESPACE)
                .subsystem("buffer"),
        )?;
        let reports_ingested = Counter::with_opts(
            Opts::new(
                "reports_ingested_total",
                "Total reports inserted into the buffer.",
            )
            .namespace(NAMESPACE),
        )?;
        let reports_rejected = CounterVec::new(
            Opts::new(
                "reports_rejected_total",
                "Total reports rejected during decoding by reason.",
            )
            .namespace(NAMESPACE),
            &["reason"],
        )?;
        let reports_stale = Counter::with_opts(
            Opts::new(
                "reports_stale_total",
                "Total reports skipped as older than the staleness cutoff.",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(inserts.clone()))?;
        registry.register(Box::new(subjects.clone()))?;
        registry.register(Box::new(buckets.clone()))?;
        registry.register(Box::new(reports_ingested.clone()))?;
        registry.register(Box::new(reports_rejected.clone()))?;
        registry.register(Box::new(reports_stale.clone()))?;

        Ok(Self {
            registry,
            inserts,
            subjects,
            buckets,
            reports_ingested,
            reports_rejected,
            reports_stale,
        })
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records the creation of a subject's bucket map.
    pub fn record_subject(&self) {
        self.subjects.inc();
    }

    /// Records a bucket creation.
    pub fn record_created(&self) {
        self.inserts.with_label_values(&["created"]).inc();
        self.buckets.inc();
    }

    /// Records an update to an existing bucket.
    pub fn record_updated(&self) {
        self.inserts.with_label_values(&["updated"]).inc();
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("encoding metrics")?;

        String::from_utf8(buffer).context("converting metrics to string")
    }
}
