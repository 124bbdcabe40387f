//! History Reconstruction
//!
//! Rebuilds the list of versions written to one key.
//!
//! ## Strategies
//!
//! - **Baseline**: drain the store's native history iterator and decode each
//!   entry. Ground truth.
//! - **BloomAccelerated**: walk sealed blocks from genesis (block 0) to the
//!   newest. A block whose bloom filter rules the key out is skipped without
//!   reading its write log; every other block is scanned with exact key
//!   equality, so false positives cost a scan and nothing more.
//!
//! Both strategies return entries in commit order. Sorting by timestamp is
//! left to the query engine.
//!
//! ## Corrupt Filters
//!
//! A filter that fails to decode is logged, counted, and treated as "may
//! contain": the block is scanned in full. A broken index never hides a
//! version.
//!
//! ## Sessions
//!
//! A [`ReconstructionSession`] keeps decoded filters for the lifetime of one
//! multi-key call so each filter is fetched and decoded at most once.

use crate::bloom::{BloomFilter, BloomFilterStats};
use crate::error::{Error, Result};
use crate::store::{BlockSource, HistoryOrder, VersionedStore};
use futures::StreamExt;
use ledgerdex_core::{HistoryEntry, WriteRecord};
use ledgerdex_observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a key's history is rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionStrategy {
    /// Drain the store's history iterator
    Baseline,
    /// Skip blocks whose bloom filter rules the key out
    #[default]
    BloomAccelerated,
}

impl fmt::Display for ReconstructionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconstructionStrategy::Baseline => write!(f, "baseline"),
            ReconstructionStrategy::BloomAccelerated => write!(f, "bloom_accelerated"),
        }
    }
}

impl FromStr for ReconstructionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(ReconstructionStrategy::Baseline),
            "bloom" | "bloom_accelerated" | "bloom-accelerated" => {
                Ok(ReconstructionStrategy::BloomAccelerated)
            }
            other => Err(format!(
                "unknown strategy '{}' (expected baseline or bloom)",
                other
            )),
        }
    }
}

/// Rebuilds key histories from a store and, optionally, its blocks.
#[derive(Clone)]
pub struct Reconstructor {
    store: Arc<dyn VersionedStore>,
    blocks: Option<Arc<dyn BlockSource>>,
    strategy: ReconstructionStrategy,
}

impl Reconstructor {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        blocks: Option<Arc<dyn BlockSource>>,
        strategy: ReconstructionStrategy,
    ) -> Self {
        Self {
            store,
            blocks,
            strategy,
        }
    }

    /// Strategy actually used: bloom acceleration needs a block source.
    pub fn effective_strategy(&self) -> ReconstructionStrategy {
        match (self.strategy, &self.blocks) {
            (ReconstructionStrategy::BloomAccelerated, Some(_)) => {
                ReconstructionStrategy::BloomAccelerated
            }
            _ => ReconstructionStrategy::Baseline,
        }
    }

    pub fn block_source(&self) -> Option<&Arc<dyn BlockSource>> {
        self.blocks.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    pub fn session(&self) -> ReconstructionSession<'_> {
        ReconstructionSession {
            reconstructor: self,
            block_count: None,
            filters: HashMap::new(),
            stats: BloomFilterStats::default(),
        }
    }

    /// Reconstruct `key` in a one-off session.
    pub async fn reconstruct(&self, key: &str) -> Result<Vec<HistoryEntry>> {
        self.session().reconstruct(key).await
    }
}

/// Filter cache and statistics shared by the keys of one call.
pub struct ReconstructionSession<'a> {
    reconstructor: &'a Reconstructor,
    block_count: Option<u64>,
    /// `None` marks a filter that failed to decode
    filters: HashMap<u64, Option<Arc<BloomFilter>>>,
    stats: BloomFilterStats,
}

impl<'a> ReconstructionSession<'a> {
    pub fn stats(&self) -> &BloomFilterStats {
        &self.stats
    }

    /// Every version of `key` in commit order.
    pub async fn reconstruct(&mut self, key: &str) -> Result<Vec<HistoryEntry>> {
        let entries = match (
            self.reconstructor.effective_strategy(),
            self.reconstructor.blocks.clone(),
        ) {
            (ReconstructionStrategy::BloomAccelerated, Some(blocks)) => {
                self.scan_blocks(blocks.as_ref(), key).await?
            }
            _ => self.drain_history(key).await?,
        };

        debug!(
            key,
            versions = entries.len(),
            strategy = %self.reconstructor.effective_strategy(),
            "Reconstructed history"
        );
        Ok(entries)
    }

    async fn drain_history(&mut self, key: &str) -> Result<Vec<HistoryEntry>> {
        let mut stream = self.reconstructor.store.history_for_key(key).await?;
        let mut entries = Vec::new();
        while let Some(native) = stream.next().await {
            entries.push(HistoryEntry::from_native(&native?)?);
        }
        if self.reconstructor.store.history_order() == HistoryOrder::NewestFirst {
            entries.reverse();
        }
        Ok(entries)
    }

    async fn scan_blocks(&mut self, blocks: &dyn BlockSource, key: &str) -> Result<Vec<HistoryEntry>> {
        let count = self.block_count(blocks).await?;
        let mut entries = Vec::new();

        for index in 0..count {
            let filter = self.filter(blocks, index).await?;
            if let Some(filter) = &filter {
                if !filter.may_contain(key.as_bytes()) {
                    self.stats.record_lookup(false, false);
                    metrics::BLOCKS_SKIPPED_TOTAL.inc();
                    continue;
                }
            }

            let block = blocks.block_at(index).await?;
            self.stats.record_scan();
            metrics::BLOCKS_SCANNED_TOTAL.inc();

            let before = entries.len();
            entries.extend(block.writes_for(key).map(WriteRecord::to_history_entry));

            if filter.is_some() {
                self.stats.record_lookup(true, entries.len() > before);
            }
        }

        Ok(entries)
    }

    async fn block_count(&mut self, blocks: &dyn BlockSource) -> Result<u64> {
        if let Some(count) = self.block_count {
            return Ok(count);
        }
        let count = blocks.block_count().await?;
        self.block_count = Some(count);
        Ok(count)
    }

    async fn filter(&mut self, blocks: &dyn BlockSource, index: u64) -> Result<Option<Arc<BloomFilter>>> {
        if let Some(cached) = self.filters.get(&index) {
            return Ok(cached.clone());
        }

        let bytes = blocks.filter_at(index).await?;
        let decoded = match BloomFilter::from_bytes(&bytes) {
            Ok(filter) => Some(Arc::new(filter)),
            Err(Error::CorruptIndex(reason)) => {
                warn!(block = index, reason = %reason, "Corrupt bloom filter, scanning block in full");
                self.stats.record_corrupt();
                metrics::CORRUPT_FILTERS_TOTAL.inc();
                None
            }
            Err(e) => return Err(e),
        };

        self.filters.insert(index, decoded.clone());
        Ok(decoded)
    }
}
