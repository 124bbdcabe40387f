//! History Entries
//!
//! Every committed write of a key produces one [`HistoryEntry`]. Entries are
//! immutable: created on commit, never mutated, never deleted.
//!
//! ## Ordering
//! A key's history is ordered by [`LogicalTime`]. Two writes may share a
//! timestamp, so callers sort with a *stable* sort over entries that are
//! already in commit order; ties then keep commit order. `commit_id` is an
//! opaque identifier assigned by the ledger and carries no ordering.
//!
//! ## Native Entries
//! Ledgers hand back history in their own shape: raw value bytes plus the
//! transaction id and commit time. [`NativeHistoryEntry`] models that shape
//! and [`HistoryEntry::from_native`] decodes it.

use crate::error::Result;
use crate::record::Record;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Commit time of a write, as seconds plus nanoseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogicalTime {
    pub seconds: i64,
    pub nanos: u32,
}

impl LogicalTime {
    /// Create a time, carrying whole seconds out of `nanos`.
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds: seconds + (nanos / NANOS_PER_SEC) as i64,
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// The smallest time strictly after `self`.
    pub fn next_tick(&self) -> Self {
        Self::new(self.seconds, self.nanos + 1)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

impl From<DateTime<Utc>> for LogicalTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::new(dt.timestamp(), dt.timestamp_subsec_nanos())
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => write!(f, "{}.{:09}", self.seconds, self.nanos),
        }
    }
}

/// One immutable version of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub value: Record,
    pub timestamp: LogicalTime,
    pub commit_id: String,
}

impl HistoryEntry {
    pub fn new(value: Record, timestamp: LogicalTime, commit_id: impl Into<String>) -> Self {
        Self {
            value,
            timestamp,
            commit_id: commit_id.into(),
        }
    }

    /// Decode a ledger-native entry.
    pub fn from_native(native: &NativeHistoryEntry) -> Result<Self> {
        Ok(Self {
            value: Record::from_bytes(&native.value)?,
            timestamp: native.timestamp,
            commit_id: native.tx_id.clone(),
        })
    }
}

/// History entry as a ledger's history iterator yields it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeHistoryEntry {
    pub value: Bytes,
    pub timestamp: LogicalTime,
    pub tx_id: String,
}
