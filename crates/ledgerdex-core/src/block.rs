//! Blocks
//!
//! A block is an immutable, sequentially numbered unit of committed writes.
//! Block 0 is the genesis block. Alongside its ordered write records a block
//! carries the serialized bloom filter built over its keys when the block was
//! sealed; this crate treats those bytes as opaque.

use crate::history::{HistoryEntry, LogicalTime};
use crate::record::Record;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single committed write inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub commit_id: String,
    pub key: String,
    pub value: Record,
    pub timestamp: LogicalTime,
}

impl WriteRecord {
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry::new(self.value.clone(), self.timestamp, self.commit_id.clone())
    }
}

/// A sealed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block number, 0 for genesis
    pub number: u64,

    /// Serialized bloom filter over the keys in `writes`
    pub bloom_filter: Bytes,

    /// Writes in commit order
    pub writes: Vec<WriteRecord>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Writes to `key`, confirmed by exact key equality, in commit order.
    pub fn writes_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a WriteRecord> + 'a {
        self.writes.iter().filter(move |w| w.key == key)
    }

    pub fn info(&self) -> BlockInfo {
        BlockInfo {
            number: self.number,
            write_count: self.writes.len(),
            filter_bytes: self.bloom_filter.len(),
            first_timestamp: self.writes.first().map(|w| w.timestamp),
            last_timestamp: self.writes.last().map(|w| w.timestamp),
        }
    }
}

/// Summary of a block, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub write_count: usize,
    pub filter_bytes: usize,
    pub first_timestamp: Option<LogicalTime>,
    pub last_timestamp: Option<LogicalTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn write(key: &str, commit: &str, secs: i64) -> WriteRecord {
        WriteRecord {
            commit_id: commit.to_string(),
            key: key.to_string(),
            value: Record::new("order", Map::new()),
            timestamp: LogicalTime::from_seconds(secs),
        }
    }

    #[test]
    fn test_writes_for_exact_match_only() {
        let block = Block {
            number: 3,
            bloom_filter: Bytes::new(),
            writes: vec![write("910", "a", 1), write("9104", "b", 2), write("910", "c", 3)],
        };

        let commits: Vec<_> = block.writes_for("910").map(|w| w.commit_id.as_str()).collect();
        assert_eq!(commits, vec!["a", "c"]);
    }

    #[test]
    fn test_block_info() {
        let block = Block {
            number: 1,
            bloom_filter: Bytes::from_static(&[0u8; 16]),
            writes: vec![write("k", "a", 10), write("k", "b", 20)],
        };

        let info = block.info();
        assert_eq!(info.write_count, 2);
        assert_eq!(info.filter_bytes, 16);
        assert_eq!(info.first_timestamp, Some(LogicalTime::from_seconds(10)));
        assert_eq!(info.last_timestamp, Some(LogicalTime::from_seconds(20)));
    }
}
