//! Ledger Collaborator Traits
//!
//! The query engine and the ingestion pipeline never talk to a ledger
//! directly. They consume two narrow traits:
//!
//! - [`VersionedStore`]: current state plus each key's append-only history
//! - [`BlockSource`]: sealed blocks with their serialized bloom filters
//!
//! Range bounds follow the ledger convention: an empty `start` or `end`
//! means the range is unbounded on that side.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use ledgerdex_core::{Block, LogicalTime, NativeHistoryEntry, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stream of `(key, current value)` pairs in key order
pub type KeyValueStream = BoxStream<'static, Result<(String, Record)>>;

/// Stream of a key's native history entries
pub type HistoryStream = BoxStream<'static, Result<NativeHistoryEntry>>;

/// Acknowledgement of an accepted write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub commit_id: String,
    pub key: String,
    pub timestamp: LogicalTime,
}

/// Order in which a store's history iterator yields versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    /// Oldest version first
    #[default]
    OldestFirst,
    /// Newest version first, as Fabric's `GetHistoryForKey` yields
    NewestFirst,
}

/// Current-state and history access to a keyed ledger.
///
/// Versions sharing a timestamp are ordered by commit order, and the
/// baseline reconstruction takes commit order from
/// [`history_for_key`](Self::history_for_key). A store whose iterator does
/// not yield oldest first must say so through
/// [`history_order`](Self::history_order).
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Upsert `value` under `key`, appending a new version.
    async fn put(&self, key: &str, value: Record) -> Result<CommitReceipt>;

    /// Current value of `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// Current values for keys in `[start, end)`, in key order.
    async fn range_scan(&self, start: &str, end: &str) -> Result<KeyValueStream>;

    /// Every committed version of `key`, in [`history_order`](Self::history_order).
    async fn history_for_key(&self, key: &str) -> Result<HistoryStream>;

    fn history_order(&self) -> HistoryOrder {
        HistoryOrder::OldestFirst
    }
}

/// Read access to sealed blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Number of sealed blocks, genesis included
    async fn block_count(&self) -> Result<u64>;

    async fn block_at(&self, index: u64) -> Result<Block>;

    /// Serialized bloom filter of block `index`.
    ///
    /// Sources that can fetch the filter without the write log should
    /// override this.
    async fn filter_at(&self, index: u64) -> Result<Bytes> {
        Ok(self.block_at(index).await?.bloom_filter)
    }
}

#[async_trait]
impl<T: VersionedStore + ?Sized> VersionedStore for Arc<T> {
    async fn put(&self, key: &str, value: Record) -> Result<CommitReceipt> {
        (**self).put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        (**self).get(key).await
    }

    async fn range_scan(&self, start: &str, end: &str) -> Result<KeyValueStream> {
        (**self).range_scan(start, end).await
    }

    async fn history_for_key(&self, key: &str) -> Result<HistoryStream> {
        (**self).history_for_key(key).await
    }

    fn history_order(&self) -> HistoryOrder {
        (**self).history_order()
    }
}

#[async_trait]
impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    async fn block_count(&self) -> Result<u64> {
        (**self).block_count().await
    }

    async fn block_at(&self, index: u64) -> Result<Block> {
        (**self).block_at(index).await
    }

    async fn filter_at(&self, index: u64) -> Result<Bytes> {
        (**self).filter_at(index).await
    }
}

/// Whether `key` falls in `[start, end)` with empty bounds unbounded.
pub fn in_key_range(key: &str, start: &str, end: &str) -> bool {
    (start.is_empty() || key >= start) && (end.is_empty() || key < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_key_range_half_open() {
        assert!(in_key_range("b", "a", "c"));
        assert!(in_key_range("a", "a", "c"));
        assert!(!in_key_range("c", "a", "c"));
    }

    #[test]
    fn test_in_key_range_empty_bounds_unbounded() {
        assert!(in_key_range("zzz", "", ""));
        assert!(in_key_range("0", "", "1"));
        assert!(!in_key_range("0", "1", ""));
    }
}
