//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Query Errors
//! - `KeyNotFound`: the key has no current value
//! - `VersionOutOfRange`: a point query asked for a version past the end
//! - `InvalidRange`: a range with `start > end`, or a zero page size
//!
//! ### Index Errors
//! - `CorruptIndex`: bloom filter bytes failed to decode. Reconstruction
//!   recovers from this locally by scanning the block in full.
//!
//! ### Store Errors
//! - `StoreUnavailable`: the ledger could not be reached
//! - `Rejected`: the ledger refused a write (endorsement or admission failure)
//! - `Timeout`: a write did not complete in time
//! - `WriteFailed`: any other per-record write failure
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Version {version} out of range for key {key} ({len} versions)")]
    VersionOutOfRange {
        key: String,
        version: usize,
        len: usize,
    },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Corrupt bloom filter: {0}")]
    CorruptIndex(String),

    #[error("No block source configured")]
    NoBlockSource,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Write timed out: {0}")]
    Timeout(String),

    #[error("Write failed for key {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Record error: {0}")]
    Core(#[from] ledgerdex_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::Rejected(_) | Error::Timeout(_)
        )
    }
}
