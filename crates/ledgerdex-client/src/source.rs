//! Record file loaders.
//!
//! Two JSON layouts are understood:
//!
//! ```text
//! Records      [ {..}, {..}, ... ]            or   { "table": [ {..}, ... ] }
//! BlockStream  [ [header, tx, tx, ...], [header, tx, ...], ... ]
//! ```
//!
//! Block streams are flattened into their transactions in block order; the
//! header of each block is dropped.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const TABLE_FIELD: &str = "table";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Pick the layout from the document shape
    #[default]
    Auto,
    /// Array of record objects, bare or under `table`
    Records,
    /// Array of blocks, each `[header, tx...]`
    BlockStream,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Auto => write!(f, "auto"),
            SourceFormat::Records => write!(f, "records"),
            SourceFormat::BlockStream => write!(f, "block_stream"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SourceFormat::Auto),
            "records" | "table" => Ok(SourceFormat::Records),
            "block_stream" | "block-stream" | "blocks" => Ok(SourceFormat::BlockStream),
            other => Err(ClientError::ConfigError(format!(
                "unknown source format '{}'",
                other
            ))),
        }
    }
}

/// Guess the layout of a parsed document.
///
/// A non-empty top-level array whose first element is itself an array is a
/// block stream; any other array or a `table` object holds records.
pub fn detect_format(document: &Value) -> Option<SourceFormat> {
    match document {
        Value::Array(items) => match items.first() {
            Some(Value::Array(_)) => Some(SourceFormat::BlockStream),
            _ => Some(SourceFormat::Records),
        },
        Value::Object(map) if map.get(TABLE_FIELD).map_or(false, Value::is_array) => {
            Some(SourceFormat::Records)
        }
        _ => None,
    }
}

/// Extract the records of an already parsed document.
pub fn parse_records(document: Value, format: SourceFormat) -> Result<Vec<Value>> {
    match format {
        SourceFormat::Records => records_from(document),
        SourceFormat::BlockStream => transactions_from(document),
        SourceFormat::Auto => match detect_format(&document) {
            Some(SourceFormat::BlockStream) => transactions_from(document),
            Some(_) => records_from(document),
            None => Err(ClientError::InvalidInput(
                "expected a JSON array or an object with a 'table' array".to_string(),
            )),
        },
    }
}

/// Read a JSON file and return its records.
pub async fn load_records(path: impl AsRef<Path>, format: SourceFormat) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await?;
    let document: Value = serde_json::from_slice(&data)?;
    let records = parse_records(document, format)?;

    debug!(
        path = %path.display(),
        %format,
        records = records.len(),
        "Loaded records"
    );
    Ok(records)
}

fn records_from(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(TABLE_FIELD) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ClientError::InvalidInput(
                "record object has no 'table' array".to_string(),
            )),
        },
        _ => Err(ClientError::InvalidInput(
            "records must be a JSON array".to_string(),
        )),
    }
}

fn transactions_from(document: Value) -> Result<Vec<Value>> {
    let blocks = match document {
        Value::Array(blocks) => blocks,
        _ => {
            return Err(ClientError::InvalidInput(
                "block stream must be a JSON array of blocks".to_string(),
            ))
        }
    };

    let mut transactions = Vec::new();
    for (number, block) in blocks.into_iter().enumerate() {
        match block {
            Value::Array(entries) if !entries.is_empty() => {
                transactions.extend(entries.into_iter().skip(1));
            }
            Value::Array(_) => {
                return Err(ClientError::InvalidInput(format!(
                    "block {} has no header",
                    number
                )))
            }
            _ => {
                return Err(ClientError::InvalidInput(format!(
                    "block {} is not an array",
                    number
                )))
            }
        }
    }
    Ok(transactions)
}
