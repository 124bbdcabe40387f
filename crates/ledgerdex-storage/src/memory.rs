//! In-Memory Reference Ledger
//!
//! [`MemoryLedger`] implements both [`VersionedStore`] and [`BlockSource`]
//! over a vector of sealed blocks and a current-state map. It exists so the
//! query engine and ingestion pipeline can run end to end without a real
//! ledger; it is not a storage engine.
//!
//! ## Blocks
//!
//! ```text
//! put ──► open block ──(max_writes_per_block or seal_block)──► sealed block
//!                                                                  │
//!                                          bloom filter built here ┘
//! ```
//!
//! Block 0 is an empty genesis block. Writes accumulate in an open block and
//! become visible to `get`, `range_scan`, `history_for_key` and the block
//! source only once that block is sealed, the way a ledger exposes a write
//! only after its block commits.
//!
//! ## Timestamps
//!
//! `put` stamps each write with the wall clock, bumped by a nanosecond when
//! needed so stamps never go backwards. `put_at` takes the stamp from the
//! caller, which lets tests produce tied timestamps.
//!
//! ## Snapshots
//!
//! `save` and `load` round-trip the blocks as JSON so a command-line session
//! can pick up a ledger left by a previous invocation.

use crate::bloom::BloomFilter;
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::store::{
    in_key_range, BlockSource, CommitReceipt, HistoryStream, KeyValueStream, VersionedStore,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use ledgerdex_core::{Block, BlockInfo, LogicalTime, NativeHistoryEntry, Record, WriteRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    blocks: Vec<Block>,
    open: Vec<WriteRecord>,
    current: BTreeMap<String, Record>,
    last_timestamp: LogicalTime,
}

impl LedgerState {
    fn apply_block(&mut self, block: &Block) {
        for write in &block.writes {
            self.current.insert(write.key.clone(), write.value.clone());
            self.last_timestamp = self.last_timestamp.max(write.timestamp);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerSnapshot {
    blocks: Vec<Block>,
    #[serde(default)]
    open: Vec<WriteRecord>,
}

/// Reference ledger held entirely in memory.
#[derive(Debug)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    config: LedgerConfig,
}

impl MemoryLedger {
    /// Create a ledger holding only the genesis block.
    pub fn new(config: LedgerConfig) -> Self {
        let genesis = seal(0, Vec::new(), &config);
        Self {
            state: RwLock::new(LedgerState {
                blocks: vec![genesis],
                ..Default::default()
            }),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Append a write with a caller-chosen timestamp.
    pub async fn put_at(
        &self,
        key: &str,
        value: Record,
        timestamp: LogicalTime,
    ) -> Result<CommitReceipt> {
        let mut state = self.state.write().await;
        Ok(self.append(&mut state, key, value, timestamp))
    }

    /// Seal the open block. Returns the new block's number, or `None` when
    /// there was nothing to seal.
    pub async fn seal_block(&self) -> Option<u64> {
        let mut state = self.state.write().await;
        self.seal_open(&mut state)
    }

    /// Writes accepted but not yet sealed into a block
    pub async fn pending_writes(&self) -> usize {
        self.state.read().await.open.len()
    }

    /// Summaries of every sealed block
    pub async fn block_infos(&self) -> Vec<BlockInfo> {
        self.state
            .read()
            .await
            .blocks
            .iter()
            .map(Block::info)
            .collect()
    }

    /// Every sealed write, in commit order.
    pub async fn all_writes(&self) -> Vec<WriteRecord> {
        self.state
            .read()
            .await
            .blocks
            .iter()
            .flat_map(|b| b.writes.iter().cloned())
            .collect()
    }

    /// Write a JSON snapshot of the ledger to `path`.
    ///
    /// The snapshot goes to a sibling `.tmp` file that is then renamed over
    /// `path`, so an interrupted save leaves the previous snapshot intact.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = {
            let state = self.state.read().await;
            serde_json::to_vec(&LedgerSnapshot {
                blocks: state.blocks.clone(),
                open: state.open.clone(),
            })?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = snapshot_tmp_path(path);
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), "Saved ledger snapshot");
        Ok(())
    }

    /// Load a snapshot written by [`save`](Self::save).
    pub async fn load(path: impl AsRef<Path>, config: LedgerConfig) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let snapshot: LedgerSnapshot = serde_json::from_slice(&data)?;

        for (expected, block) in snapshot.blocks.iter().enumerate() {
            if block.number != expected as u64 {
                return Err(Error::CorruptIndex(format!(
                    "snapshot block {} stored at position {}",
                    block.number, expected
                )));
            }
        }

        let blocks = if snapshot.blocks.is_empty() {
            vec![seal(0, Vec::new(), &config)]
        } else {
            snapshot.blocks
        };

        let mut state = LedgerState::default();
        for block in &blocks {
            state.apply_block(block);
        }
        for write in &snapshot.open {
            state.last_timestamp = state.last_timestamp.max(write.timestamp);
        }
        state.blocks = blocks;
        state.open = snapshot.open;

        info!(
            path = %path.display(),
            blocks = state.blocks.len(),
            pending = state.open.len(),
            "Loaded ledger snapshot"
        );

        Ok(Self {
            state: RwLock::new(state),
            config,
        })
    }

    /// Load `path` if it exists, otherwise start a fresh ledger.
    pub async fn open(path: impl AsRef<Path>, config: LedgerConfig) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await? {
            Self::load(path, config).await
        } else {
            Ok(Self::new(config))
        }
    }

    fn append(
        &self,
        state: &mut LedgerState,
        key: &str,
        value: Record,
        timestamp: LogicalTime,
    ) -> CommitReceipt {
        let commit_id = Uuid::new_v4().simple().to_string();
        state.last_timestamp = state.last_timestamp.max(timestamp);
        state.open.push(WriteRecord {
            commit_id: commit_id.clone(),
            key: key.to_string(),
            value,
            timestamp,
        });

        if state.open.len() >= self.config.max_writes_per_block.max(1) {
            self.seal_open(state);
        }

        CommitReceipt {
            commit_id,
            key: key.to_string(),
            timestamp,
        }
    }

    fn seal_open(&self, state: &mut LedgerState) -> Option<u64> {
        if state.open.is_empty() {
            return None;
        }

        let number = state.blocks.len() as u64;
        let writes = std::mem::take(&mut state.open);
        let block = seal(number, writes, &self.config);
        state.apply_block(&block);

        debug!(
            block = number,
            writes = block.len(),
            filter_bytes = block.bloom_filter.len(),
            "Sealed block"
        );

        state.blocks.push(block);
        Some(number)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

fn seal(number: u64, writes: Vec<WriteRecord>, config: &LedgerConfig) -> Block {
    let mut keys: Vec<&str> = writes.iter().map(|w| w.key.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();

    let filter = BloomFilter::for_keys(&keys, &config.bloom);
    Block {
        number,
        bloom_filter: filter.to_bytes(),
        writes,
    }
}

fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl VersionedStore for MemoryLedger {
    async fn put(&self, key: &str, value: Record) -> Result<CommitReceipt> {
        let mut state = self.state.write().await;
        let now = LogicalTime::now();
        let timestamp = if now > state.last_timestamp {
            now
        } else {
            state.last_timestamp.next_tick()
        };
        Ok(self.append(&mut state, key, value, timestamp))
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.state.read().await.current.get(key).cloned())
    }

    async fn range_scan(&self, start: &str, end: &str) -> Result<KeyValueStream> {
        let state = self.state.read().await;
        let items: Vec<Result<(String, Record)>> = state
            .current
            .iter()
            .filter(|(key, _)| in_key_range(key, start, end))
            .map(|(key, value)| Ok((key.clone(), value.clone())))
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn history_for_key(&self, key: &str) -> Result<HistoryStream> {
        let state = self.state.read().await;
        let mut entries = Vec::new();
        for write in state.blocks.iter().flat_map(|b| b.writes_for(key)) {
            entries.push(Ok(NativeHistoryEntry {
                value: Bytes::from(write.value.to_bytes()?),
                timestamp: write.timestamp,
                tx_id: write.commit_id.clone(),
            }));
        }
        Ok(stream::iter(entries).boxed())
    }
}

#[async_trait]
impl BlockSource for MemoryLedger {
    async fn block_count(&self) -> Result<u64> {
        Ok(self.state.read().await.blocks.len() as u64)
    }

    async fn block_at(&self, index: u64) -> Result<Block> {
        self.state
            .read()
            .await
            .blocks
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::StoreUnavailable(format!("block {} does not exist", index)))
    }

    async fn filter_at(&self, index: u64) -> Result<Bytes> {
        self.state
            .read()
            .await
            .blocks
            .get(index as usize)
            .map(|b| b.bloom_filter.clone())
            .ok_or_else(|| Error::StoreUnavailable(format!("block {} does not exist", index)))
    }
}
