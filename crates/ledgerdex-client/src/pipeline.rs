//! Wave-Throttled Bulk Ingestion
//!
//! [`IngestPipeline`] writes a large record set into a [`VersionedStore`]
//! without overwhelming it. The records are planned into chunks and waves
//! (see [`crate::batch`]); each wave's chunks run concurrently, the records
//! inside a chunk are written one after another, and waves are spaced by an
//! inter-wave delay that adapts to ledger backpressure.
//!
//! ## Dispatch Timeline
//!
//! ```text
//! t=0          t=D            t=2D
//! │ wave 0     │ wave 1       │ wave 2
//! │ ████████   │ ████████████████ (overran D)
//! │            │                  │ wave 2 starts at completion
//! ```
//!
//! Wave `n+1` starts at `max(start(n) + delay, completion(n))`, where `delay`
//! is the adaptive delay after wave `n` settles.
//!
//! ## Failure Handling
//!
//! A record that cannot be keyed or written is recorded in the report with
//! its input index, key, and [`ErrorKind`]. The batch always continues. The
//! only errors returned from [`IngestPipeline::ingest`] are configuration
//! errors, raised before anything is written.

use crate::batch::{Chunk, IngestionBatch};
use crate::delay::AdaptiveDelay;
use crate::error::{ClientError, ErrorKind, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::shutdown::ShutdownHandle;
use futures::stream::{self, StreamExt};
use ledgerdex_core::KeyPolicy;
use ledgerdex_observability::metrics;
use ledgerdex_storage::{Error as StorageError, VersionedStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// Settings for one ingestion run.
///
/// ```
/// use ledgerdex_client::IngestConfig;
///
/// let config: IngestConfig = serde_json::from_str(r#"{"chunk_size": 500}"#).unwrap();
/// assert_eq!(config.chunk_size, 500);
/// assert_eq!(config.wave_size, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Records per chunk (default: 1000)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks per wave (default: 30)
    #[serde(default = "default_wave_size")]
    pub wave_size: usize,

    /// Base delay between wave starts in milliseconds (default: 30000).
    /// [`IngestPipeline::with_wave_delay`] takes a finer `Duration`.
    #[serde(default = "default_wave_delay_ms")]
    pub wave_delay_ms: u64,

    /// Ceiling for the adaptive delay in milliseconds (default: 300000)
    #[serde(default = "default_max_wave_delay_ms")]
    pub max_wave_delay_ms: u64,

    /// Delay growth factor under backpressure (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Rejected or timed-out writes in one wave that trigger a longer delay
    /// (default: 1, 0 disables adaptation)
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: usize,

    /// Upper bound on a single record write in milliseconds (default: 30000)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Chunks in flight at once; `None` means the whole wave
    #[serde(default)]
    pub max_concurrent_chunks: Option<usize>,

    /// How records are keyed
    #[serde(default)]
    pub key_policy: KeyPolicy,

    /// Per-record retry; `None` reports the first failure
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_wave_size() -> usize {
    30
}

fn default_wave_delay_ms() -> u64 {
    30_000
}

fn default_max_wave_delay_ms() -> u64 {
    300_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_rejection_threshold() -> usize {
    1
}

fn default_write_timeout_ms() -> u64 {
    30_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            wave_size: default_wave_size(),
            wave_delay_ms: default_wave_delay_ms(),
            max_wave_delay_ms: default_max_wave_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            rejection_threshold: default_rejection_threshold(),
            write_timeout_ms: default_write_timeout_ms(),
            max_concurrent_chunks: None,
            key_policy: KeyPolicy::default(),
            retry: None,
        }
    }
}

impl IngestConfig {
    pub fn wave_delay(&self) -> Duration {
        Duration::from_millis(self.wave_delay_ms)
    }

    pub fn max_wave_delay(&self) -> Duration {
        Duration::from_millis(self.max_wave_delay_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Chunks allowed in flight at once
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_chunks.unwrap_or(self.wave_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ClientError::ConfigError(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.wave_size == 0 {
            return Err(ClientError::ConfigError(
                "wave_size must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_chunks == Some(0) {
            return Err(ClientError::ConfigError(
                "max_concurrent_chunks must be at least 1".to_string(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "write_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One record that was not written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    /// Position of the record in the input
    pub index: usize,
    /// Derived key, absent when key derivation failed
    pub key: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionReport {
    pub total_records: usize,
    pub succeeded: usize,
    /// Failed records ordered by input index
    pub failed: Vec<RecordFailure>,
    /// Records whose write was attempted; less than `total_records` only
    /// after cancellation
    pub attempted: usize,
    pub waves_dispatched: usize,
    pub cancelled: bool,
    /// Inter-wave delay in effect when the run ended
    pub final_wave_delay: Duration,
    pub elapsed: Duration,
}

impl IngestionReport {
    fn empty(total_records: usize, wave_delay: Duration) -> Self {
        Self {
            total_records,
            succeeded: 0,
            failed: Vec::new(),
            attempted: 0,
            waves_dispatched: 0,
            cancelled: false,
            final_wave_delay: wave_delay,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Every record attempted and written
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failed.is_empty() && self.succeeded == self.total_records
    }

    /// Failures of one kind
    pub fn failures_of(&self, kind: ErrorKind) -> impl Iterator<Item = &RecordFailure> {
        self.failed.iter().filter(move |f| f.kind == kind)
    }
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    succeeded: usize,
    failures: Vec<RecordFailure>,
}

impl ChunkOutcome {
    fn backpressure(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.kind.is_backpressure())
            .count()
    }
}

/// Bulk writer for one store.
pub struct IngestPipeline<S: VersionedStore + ?Sized> {
    store: Arc<S>,
    wave_delay: Duration,
    config: IngestConfig,
    shutdown: Option<ShutdownHandle>,
}

impl<S: VersionedStore + ?Sized> IngestPipeline<S> {
    pub fn new(store: Arc<S>, config: IngestConfig) -> Self {
        Self {
            store,
            wave_delay: config.wave_delay(),
            config,
            shutdown: None,
        }
    }

    /// Base delay between wave starts, overriding `wave_delay_ms` with
    /// sub-millisecond precision.
    pub fn with_wave_delay(mut self, delay: Duration) -> Self {
        self.wave_delay = delay;
        self
    }

    /// Stop dispatching new waves once `handle` is triggered.
    pub fn with_shutdown(mut self, handle: ShutdownHandle) -> Self {
        self.shutdown = Some(handle);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Write every record, wave by wave, and report what happened.
    #[tracing::instrument(skip(self, records), fields(records = records.len(), chunk_size = self.config.chunk_size, wave_size = self.config.wave_size))]
    pub async fn ingest(&self, records: Vec<Value>) -> Result<IngestionReport> {
        self.config.validate()?;
        let batch = IngestionBatch::plan(
            records.len(),
            self.config.chunk_size,
            self.config.wave_size,
            self.wave_delay,
        )?;

        let started = Instant::now();
        let mut report = IngestionReport::empty(batch.total_records, self.wave_delay);
        if batch.wave_count() == 0 {
            debug!("No records to ingest");
            return Ok(report);
        }

        info!(
            chunks = batch.chunk_count(),
            waves = batch.wave_count(),
            wave_delay = ?self.wave_delay,
            "Starting ingestion"
        );

        let mut delay = AdaptiveDelay::new(
            self.wave_delay,
            self.config.max_wave_delay(),
            self.config.backoff_multiplier,
            self.config.rejection_threshold,
        );
        metrics::INGEST_WAVE_DELAY_SECONDS.set(delay.current().as_secs_f64());

        let mut shutdown = self.shutdown.clone();
        let mut remaining = records.into_iter();
        let mut next_start = started;

        for wave in &batch.waves {
            if wave.index > 0 {
                match shutdown.as_mut() {
                    Some(handle) => {
                        tokio::select! {
                            _ = sleep_until(next_start) => {}
                            signal = handle.wait() => {
                                info!(%signal, wave = wave.index, "Ingestion cancelled while waiting for next wave");
                                report.cancelled = true;
                                break;
                            }
                        }
                    }
                    None => sleep_until(next_start).await,
                }
            }

            if shutdown.as_ref().map_or(false, ShutdownHandle::is_shutdown) {
                info!(wave = wave.index, "Ingestion cancelled before wave dispatch");
                report.cancelled = true;
                break;
            }

            let wave_started = Instant::now();
            let work: Vec<(&Chunk, Vec<Value>)> = wave
                .chunks
                .iter()
                .map(|chunk| (chunk, remaining.by_ref().take(chunk.len()).collect()))
                .collect();

            debug!(
                wave = wave.index,
                chunks = work.len(),
                records = wave.record_count(),
                "Dispatching wave"
            );

            let outcomes: Vec<ChunkOutcome> = stream::iter(work)
                .map(|(chunk, items)| self.write_chunk(chunk, items))
                .buffer_unordered(self.config.concurrency())
                .collect()
                .await;

            let mut backpressure = 0;
            let mut wave_failures = 0;
            for outcome in outcomes {
                backpressure += outcome.backpressure();
                wave_failures += outcome.failures.len();
                report.succeeded += outcome.succeeded;
                report.failed.extend(outcome.failures);
            }
            report.attempted += wave.record_count();
            report.waves_dispatched += 1;

            let wave_outcome = if backpressure > 0 { "degraded" } else { "clean" };
            metrics::INGEST_WAVES_TOTAL.inc();
            metrics::INGEST_WAVE_DURATION
                .with_label_values(&[wave_outcome])
                .observe(wave_started.elapsed().as_secs_f64());

            let wave_delay = delay.observe(backpressure);
            metrics::INGEST_WAVE_DELAY_SECONDS.set(wave_delay.as_secs_f64());

            info!(
                wave = wave.index,
                records = wave.record_count(),
                failed = wave_failures,
                backpressure,
                next_delay_ms = wave_delay.as_millis() as u64,
                "Wave settled"
            );

            next_start = (wave_started + wave_delay).max(Instant::now());
        }

        report.failed.sort_by_key(|f| f.index);
        report.final_wave_delay = delay.current();
        report.elapsed = started.elapsed();

        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            attempted = report.attempted,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Ingestion finished"
        );

        Ok(report)
    }

    async fn write_chunk(&self, chunk: &Chunk, items: Vec<Value>) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();

        for (index, raw) in chunk.records.clone().zip(items) {
            match self.write_record(index, raw).await {
                Ok(()) => {
                    outcome.succeeded += 1;
                    metrics::INGEST_RECORDS_TOTAL
                        .with_label_values(&["succeeded"])
                        .inc();
                }
                Err(failure) => {
                    metrics::INGEST_RECORDS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    metrics::INGEST_FAILURES_TOTAL
                        .with_label_values(&[failure.kind.as_str()])
                        .inc();
                    outcome.failures.push(failure);
                }
            }
        }

        outcome
    }

    async fn write_record(
        &self,
        index: usize,
        raw: Value,
    ) -> std::result::Result<(), RecordFailure> {
        let (key, record) = self.config.key_policy.derive(raw).map_err(|err| {
            debug!(index, error = %err, "Record has no usable key");
            RecordFailure {
                index,
                key: None,
                kind: ErrorKind::KeyDerivation,
                message: err.to_string(),
            }
        })?;

        let limit = self.config.write_timeout();
        let attempt = || async {
            match timeout(limit, self.store.put(key.as_str(), record.clone())).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout(format!(
                    "write of '{}' exceeded {}ms",
                    key,
                    limit.as_millis()
                ))),
            }
        };

        let result = match &self.config.retry {
            Some(policy) => retry_with_backoff(policy, attempt).await,
            None => attempt().await,
        };

        result.map(|_| ()).map_err(|err| {
            let kind = ErrorKind::from_storage(&err);
            warn!(index, key = %key, %kind, error = %err, "Record write failed");
            RecordFailure {
                index,
                key: Some(key.into_string()),
                kind,
                message: err.to_string(),
            }
        })
    }
}

/// Ingest `records` with chunk size `chunk_size`, `wave_size` chunks per
/// wave, and `wave_delay` between wave starts. Everything else uses
/// [`IngestConfig`] defaults.
pub async fn ingest<S: VersionedStore + ?Sized>(
    store: Arc<S>,
    records: Vec<Value>,
    chunk_size: usize,
    wave_size: usize,
    wave_delay: Duration,
) -> Result<IngestionReport> {
    let config = IngestConfig {
        chunk_size,
        wave_size,
        ..Default::default()
    };
    IngestPipeline::new(store, config)
        .with_wave_delay(wave_delay)
        .ingest(records)
        .await
}
