//! LedgerDex Client - Bulk Ingestion
//!
//! This crate loads large record sets and writes them into a versioned ledger
//! in throttled waves. It handles batch planning, concurrent chunk dispatch,
//! adaptive inter-wave delay, optional per-record retry, and cancellation.
//!
//! # Examples
//!
//! ```ignore
//! use ledgerdex_client::{load_records, IngestConfig, IngestPipeline, SourceFormat};
//! use ledgerdex_storage::MemoryLedger;
//! use std::sync::Arc;
//!
//! let records = load_records("lineitem.json", SourceFormat::Auto).await?;
//! let ledger = Arc::new(MemoryLedger::default());
//!
//! let report = IngestPipeline::new(ledger, IngestConfig::default())
//!     .ingest(records)
//!     .await?;
//!
//! for failure in &report.failed {
//!     eprintln!("record {} failed: {}", failure.index, failure.kind);
//! }
//! ```

pub mod batch;
pub mod delay;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod shutdown;
pub mod source;

pub use batch::{Chunk, IngestionBatch, Wave};
pub use delay::AdaptiveDelay;
pub use error::{ClientError, ErrorKind, Result};
pub use pipeline::{ingest, IngestConfig, IngestPipeline, IngestionReport, RecordFailure};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use shutdown::{install_signal_handler, shutdown_signal, ShutdownHandle, ShutdownSignal};
pub use source::{detect_format, load_records, parse_records, SourceFormat};
