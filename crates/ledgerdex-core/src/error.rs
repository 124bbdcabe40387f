//! Error Types for LedgerDex Core
//!
//! ## Error Categories
//!
//! ### I/O and Encoding Errors
//! - `Io`: reading record files or snapshots
//! - `Json`: malformed JSON documents
//!
//! ### Data Errors
//! - `InvalidRecord`: a value that is not a flat JSON object
//! - `KeyDerivation`: the identifier field a [`KeyPolicy`](crate::KeyPolicy)
//!   needs is missing or malformed
//!
//! ## Usage
//! All functions in this crate return `Result<T>`, aliased to
//! `Result<T, Error>`, so `?` works across the workspace.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Cannot derive key from field '{field}': {reason}")]
    KeyDerivation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
