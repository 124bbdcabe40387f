//! History Query Engine
//!
//! Read-only queries over reconstructed key histories.
//!
//! ## Ordering
//!
//! Every query that returns versions of a key returns them sorted ascending
//! by [`LogicalTime`](ledgerdex_core::LogicalTime). The sort is stable over
//! the commit order produced by reconstruction, so versions sharing a
//! timestamp keep the order in which they were committed. Version `n` of a
//! key is the `n`-th entry (zero-based) of that ordering.
//!
//! ## Operations
//!
//! | Operation              | Result                                         |
//! |------------------------|------------------------------------------------|
//! | `full_history`         | all versions of a key                          |
//! | `point_query`          | one version by index                           |
//! | `version_range_query`  | versions `[start, end)`, clamped               |
//! | `range_over_keys`      | full history of every current key in a range   |
//! | `history_for_keys`     | full history of each listed key                |
//! | `history_page`         | one page of a key's versions                   |
//! | `fetch_all_paged`      | every page, stopping at the first short page   |
//! | `block_range_query`    | keys updated often enough in a block range     |
//! | `current_state`        | the key's current value                        |
//! | `state_range`          | current values of every key in a range         |
//! | `version_counts`       | number of versions per key in a range          |
//! | `ordered_key_range`    | histories of a run of keys from a sorted list  |

use crate::analysis::{self, VersionCount};
use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::reconstruct::{ReconstructionStrategy, Reconstructor};
use crate::store::{BlockSource, VersionedStore};
use futures::TryStreamExt;
use ledgerdex_core::{HistoryEntry, Record};
use ledgerdex_observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A key together with its ordered versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyHistory {
    pub key: String,
    pub entries: Vec<HistoryEntry>,
}

/// Read-only queries over key histories.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct HistoryQueryEngine {
    reconstructor: Reconstructor,
}

impl HistoryQueryEngine {
    /// Engine over a store alone; always reconstructs with the baseline
    /// iterator.
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self {
            reconstructor: Reconstructor::new(store, None, ReconstructionStrategy::Baseline),
        }
    }

    /// Engine over a store and its blocks.
    pub fn with_blocks(
        store: Arc<dyn VersionedStore>,
        blocks: Arc<dyn BlockSource>,
        config: QueryConfig,
    ) -> Self {
        Self {
            reconstructor: Reconstructor::new(store, Some(blocks), config.strategy),
        }
    }

    pub fn strategy(&self) -> ReconstructionStrategy {
        self.reconstructor.effective_strategy()
    }

    /// All versions of `key`, ordered by timestamp. Empty if never written.
    pub async fn full_history(&self, key: &str) -> Result<Vec<HistoryEntry>> {
        let timer = QueryTimer::start("full_history");
        let entries = self.reconstructor.reconstruct(key).await?;
        timer.finish();
        Ok(order(entries))
    }

    /// Version `version` (zero-based) of `key`.
    pub async fn point_query(&self, key: &str, version: usize) -> Result<HistoryEntry> {
        let timer = QueryTimer::start("point");
        let history = order(self.reconstructor.reconstruct(key).await?);
        timer.finish();

        let len = history.len();
        history
            .into_iter()
            .nth(version)
            .ok_or_else(|| Error::VersionOutOfRange {
                key: key.to_string(),
                version,
                len,
            })
    }

    /// Versions `[start, end)` of `key`; `end` is clamped to the history length.
    pub async fn version_range_query(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<HistoryEntry>> {
        if start > end {
            return Err(Error::InvalidRange(format!(
                "version start {} is after end {}",
                start, end
            )));
        }

        let timer = QueryTimer::start("version_range");
        let history = order(self.reconstructor.reconstruct(key).await?);
        timer.finish();

        Ok(clamp_slice(history, start, end))
    }

    /// Full history of every current key in `[start_key, end_key)`, in
    /// range-scan order. Empty bounds are unbounded.
    pub async fn range_over_keys(&self, start_key: &str, end_key: &str) -> Result<Vec<KeyHistory>> {
        let timer = QueryTimer::start("range_over_keys");
        let keys = self.scan_keys(start_key, end_key).await?;
        let result = self.histories(keys).await?;
        timer.finish();
        Ok(result)
    }

    /// Full history of each key in `keys`, in the given order.
    pub async fn history_for_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<KeyHistory>> {
        let timer = QueryTimer::start("history_for_keys");
        let keys = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let result = self.histories(keys).await?;
        timer.finish();
        Ok(result)
    }

    /// Page `page` (zero-based) of `key`'s versions, `page_size` per page.
    pub async fn history_page(
        &self,
        key: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<HistoryEntry>> {
        if page_size == 0 {
            return Err(Error::InvalidRange("page size must be positive".to_string()));
        }

        let timer = QueryTimer::start("history_page");
        let history = order(self.reconstructor.reconstruct(key).await?);
        timer.finish();

        let start = page.saturating_mul(page_size);
        Ok(clamp_slice(history, start, start.saturating_add(page_size)))
    }

    /// Every page of `key`'s versions.
    ///
    /// Paging stops at the first page shorter than `page_size`. When the
    /// history length is an exact multiple of `page_size` that final page
    /// is empty and is not returned.
    pub async fn fetch_all_paged(&self, key: &str, page_size: usize) -> Result<Vec<Vec<HistoryEntry>>> {
        if page_size == 0 {
            return Err(Error::InvalidRange("page size must be positive".to_string()));
        }

        let timer = QueryTimer::start("fetch_all_paged");
        let history = order(self.reconstructor.reconstruct(key).await?);
        timer.finish();

        let pages: Vec<Vec<HistoryEntry>> = history.chunks(page_size).map(<[_]>::to_vec).collect();
        debug!(key, page_size, pages = pages.len(), "Fetched paged history");
        Ok(pages)
    }

    /// Keys written at least `min_updates` times in blocks
    /// `[start_block, end_block]`, each with its versions from that range,
    /// ordered by key. `end_block` is clamped to the last sealed block.
    pub async fn block_range_query(
        &self,
        start_block: u64,
        end_block: u64,
        min_updates: usize,
    ) -> Result<Vec<KeyHistory>> {
        if start_block > end_block {
            return Err(Error::InvalidRange(format!(
                "block start {} is after end {}",
                start_block, end_block
            )));
        }
        let blocks = self.reconstructor.block_source().ok_or(Error::NoBlockSource)?;

        let timer = QueryTimer::start("block_range");
        let count = blocks.block_count().await?;
        let mut by_key: BTreeMap<String, Vec<HistoryEntry>> = BTreeMap::new();

        if count > 0 {
            let last = end_block.min(count - 1);
            for index in start_block..=last {
                let block = blocks.block_at(index).await?;
                for write in &block.writes {
                    by_key
                        .entry(write.key.clone())
                        .or_default()
                        .push(write.to_history_entry());
                }
            }
        }
        timer.finish();

        Ok(by_key
            .into_iter()
            .filter(|(_, entries)| entries.len() >= min_updates)
            .map(|(key, entries)| KeyHistory {
                key,
                entries: order(entries),
            })
            .collect())
    }

    /// Current value of `key`.
    pub async fn current_state(&self, key: &str) -> Result<Record> {
        metrics::QUERIES_TOTAL.with_label_values(&["current_state"]).inc();
        self.reconstructor
            .store()
            .get(key)
            .await?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Current `(key, value)` pairs for keys in `[start_key, end_key)`, in
    /// key order. Empty bounds are unbounded, so `state_range("", "")`
    /// lists the whole current state.
    pub async fn state_range(&self, start_key: &str, end_key: &str) -> Result<Vec<(String, Record)>> {
        let timer = QueryTimer::start("state_range");
        let pairs: Vec<(String, Record)> = self
            .reconstructor
            .store()
            .range_scan(start_key, end_key)
            .await?
            .try_collect()
            .await?;
        timer.finish();

        debug!(start_key, end_key, keys = pairs.len(), "Scanned current state");
        Ok(pairs)
    }

    /// Number of versions of every current key in `[start_key, end_key)`,
    /// in key order.
    pub async fn version_counts(&self, start_key: &str, end_key: &str) -> Result<Vec<VersionCount>> {
        let timer = QueryTimer::start("version_counts");
        let keys = self.scan_keys(start_key, end_key).await?;

        let mut session = self.reconstructor.session();
        let mut counts = Vec::with_capacity(keys.len());
        for key in keys {
            let versions = session.reconstruct(&key).await?.len();
            counts.push(VersionCount { key, versions });
        }
        timer.finish();
        Ok(counts)
    }

    /// Histories of `range_size` keys from the sorted `keys`, beginning at
    /// `start_key`.
    pub async fn ordered_key_range<K: AsRef<str>>(
        &self,
        keys: &[K],
        start_key: &str,
        range_size: usize,
    ) -> Result<Vec<KeyHistory>> {
        let selected = analysis::ordered_key_range(keys, start_key, range_size)?;
        self.history_for_keys(selected.as_slice()).await
    }

    async fn scan_keys(&self, start_key: &str, end_key: &str) -> Result<Vec<String>> {
        self.reconstructor
            .store()
            .range_scan(start_key, end_key)
            .await?
            .map_ok(|(key, _)| key)
            .try_collect()
            .await
    }

    async fn histories(&self, keys: Vec<String>) -> Result<Vec<KeyHistory>> {
        let mut session = self.reconstructor.session();
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            let entries = order(session.reconstruct(&key).await?);
            result.push(KeyHistory { key, entries });
        }

        let stats = session.stats();
        debug!(
            keys = result.len(),
            lookups = stats.lookups,
            blocks_scanned = stats.blocks_scanned,
            skip_rate = stats.skip_rate(),
            "Reconstructed key set"
        );
        Ok(result)
    }
}

/// Stable sort by timestamp; ties keep commit order.
fn order(mut entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    entries.sort_by_key(|e| e.timestamp);
    entries
}

fn clamp_slice<T>(items: Vec<T>, start: usize, end: usize) -> Vec<T> {
    let end = end.min(items.len());
    let start = start.min(end);
    items.into_iter().skip(start).take(end - start).collect()
}

struct QueryTimer {
    kind: &'static str,
    started: Instant,
}

impl QueryTimer {
    fn start(kind: &'static str) -> Self {
        metrics::QUERIES_TOTAL.with_label_values(&[kind]).inc();
        Self {
            kind,
            started: Instant::now(),
        }
    }

    fn finish(self) {
        metrics::QUERY_LATENCY
            .with_label_values(&[self.kind])
            .observe(self.started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_slice() {
        let items = vec![0, 1, 2, 3, 4];
        assert_eq!(clamp_slice(items.clone(), 1, 3), vec![1, 2]);
        assert_eq!(clamp_slice(items.clone(), 3, 100), vec![3, 4]);
        assert_eq!(clamp_slice(items.clone(), 7, 9), Vec::<i32>::new());
        assert_eq!(clamp_slice(items, 2, 2), Vec::<i32>::new());
    }
}
