use lazy_static::lazy_static;
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Ingestion Metrics
    // ============================================================================

    /// Records settled by the ingestion pipeline, by outcome
    pub static ref INGEST_RECORDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerdex_ingest_records_total", "Total records settled by ingestion"),
        &["outcome"] // succeeded, failed
    ).expect("metric can be created");

    /// Per-record ingestion failures, by error kind
    pub static ref INGEST_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerdex_ingest_failures_total", "Total record write failures"),
        &["error_kind"]
    ).expect("metric can be created");

    /// Waves dispatched
    pub static ref INGEST_WAVES_TOTAL: IntCounter = IntCounter::new(
        "ledgerdex_ingest_waves_total",
        "Total ingestion waves dispatched"
    ).expect("metric can be created");

    /// Current inter-wave delay after adaptive adjustment
    pub static ref INGEST_WAVE_DELAY_SECONDS: Gauge = Gauge::new(
        "ledgerdex_ingest_wave_delay_seconds",
        "Current inter-wave delay in seconds"
    ).expect("metric can be created");

    /// Wall time spent writing one wave
    pub static ref INGEST_WAVE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ledgerdex_ingest_wave_duration_seconds", "Wave write duration in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["outcome"] // clean, degraded
    ).expect("metric can be created");

    // ============================================================================
    // History Metrics
    // ============================================================================

    /// Blocks whose write log was scanned during reconstruction
    pub static ref BLOCKS_SCANNED_TOTAL: IntCounter = IntCounter::new(
        "ledgerdex_blocks_scanned_total",
        "Total blocks scanned during history reconstruction"
    ).expect("metric can be created");

    /// Blocks skipped because the bloom filter ruled the key out
    pub static ref BLOCKS_SKIPPED_TOTAL: IntCounter = IntCounter::new(
        "ledgerdex_blocks_skipped_total",
        "Total blocks skipped by bloom filter"
    ).expect("metric can be created");

    /// Bloom filters that failed to decode and forced a full block scan
    pub static ref CORRUPT_FILTERS_TOTAL: IntCounter = IntCounter::new(
        "ledgerdex_corrupt_filters_total",
        "Total corrupt bloom filters encountered"
    ).expect("metric can be created");

    /// History queries served, by query kind
    pub static ref QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerdex_queries_total", "Total history queries"),
        &["kind"]
    ).expect("metric can be created");

    /// History query latency
    pub static ref QUERY_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ledgerdex_query_latency_seconds", "History query latency in seconds")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["kind"]
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INGEST_RECORDS_TOTAL.clone()))
            .expect("ingest_records_total can be registered");
        REGISTRY
            .register(Box::new(INGEST_FAILURES_TOTAL.clone()))
            .expect("ingest_failures_total can be registered");
        REGISTRY
            .register(Box::new(INGEST_WAVES_TOTAL.clone()))
            .expect("ingest_waves_total can be registered");
        REGISTRY
            .register(Box::new(INGEST_WAVE_DELAY_SECONDS.clone()))
            .expect("ingest_wave_delay_seconds can be registered");
        REGISTRY
            .register(Box::new(INGEST_WAVE_DURATION.clone()))
            .expect("ingest_wave_duration can be registered");

        REGISTRY
            .register(Box::new(BLOCKS_SCANNED_TOTAL.clone()))
            .expect("blocks_scanned_total can be registered");
        REGISTRY
            .register(Box::new(BLOCKS_SKIPPED_TOTAL.clone()))
            .expect("blocks_skipped_total can be registered");
        REGISTRY
            .register(Box::new(CORRUPT_FILTERS_TOTAL.clone()))
            .expect("corrupt_filters_total can be registered");
        REGISTRY
            .register(Box::new(QUERIES_TOTAL.clone()))
            .expect("queries_total can be registered");
        REGISTRY
            .register(Box::new(QUERY_LATENCY.clone()))
            .expect("query_latency can be registered");
    });
}
