//! Error types for LedgerDex ingestion.
//!
//! Two kinds of failure live here and they never mix:
//!
//! - [`ClientError`] is returned from a call that could not run at all:
//!   bad configuration, an unreadable input file. Nothing was written.
//! - [`ErrorKind`] classifies a single record that failed while a batch was
//!   running. Those failures are collected into the ingestion report and
//!   never abort the batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Ingestion settings that cannot produce a valid batch plan, such as a
    /// zero chunk or wave size.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input that is not in any supported record layout.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] ledgerdex_storage::Error),

    #[error("Record error: {0}")]
    RecordError(#[from] ledgerdex_core::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Why a single record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The record had no usable key under the active key policy
    KeyDerivation,
    /// The ledger refused the write
    Rejected,
    /// The write did not complete within the write timeout
    Timeout,
    /// The ledger could not be reached
    StoreUnavailable,
    /// Any other write failure
    WriteFailed,
}

impl ErrorKind {
    pub fn from_storage(err: &ledgerdex_storage::Error) -> Self {
        use ledgerdex_storage::Error as StorageError;

        match err {
            StorageError::Rejected(_) => ErrorKind::Rejected,
            StorageError::Timeout(_) => ErrorKind::Timeout,
            StorageError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            StorageError::Core(ledgerdex_core::Error::KeyDerivation { .. }) => {
                ErrorKind::KeyDerivation
            }
            _ => ErrorKind::WriteFailed,
        }
    }

    /// Failures that signal the ledger is overloaded and the wave delay
    /// should back off
    pub fn is_backpressure(&self) -> bool {
        matches!(self, ErrorKind::Rejected | ErrorKind::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::KeyDerivation => "key_derivation",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::WriteFailed => "write_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
