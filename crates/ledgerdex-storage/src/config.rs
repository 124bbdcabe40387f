//! Storage Configuration
//!
//! ## LedgerConfig
//!
//! Controls the in-memory reference ledger:
//!
//! - **max_writes_per_block**: Seal the open block once it holds this many
//!   writes (default: 500)
//! - **bloom**: Sizing of the bloom filter built when a block is sealed
//!
//! ## QueryConfig
//!
//! - **strategy**: How a key's history is reconstructed (default:
//!   `bloom_accelerated`). Without a block source the engine always falls
//!   back to the baseline iterator.
//!
//! ## Usage
//!
//! ```
//! use ledgerdex_storage::{LedgerConfig, QueryConfig, ReconstructionStrategy};
//!
//! let ledger = LedgerConfig {
//!     max_writes_per_block: 10,
//!     ..Default::default()
//! };
//!
//! let query = QueryConfig {
//!     strategy: ReconstructionStrategy::Baseline,
//! };
//! assert_eq!(ledger.bloom.target_false_positive_rate, 0.01);
//! # let _ = query;
//! ```

use crate::bloom::BloomFilterConfig;
use crate::reconstruct::ReconstructionStrategy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Writes per block before the open block is sealed (default: 500)
    #[serde(default = "default_max_writes_per_block")]
    pub max_writes_per_block: usize,

    /// Bloom filter sizing for sealed blocks
    #[serde(default)]
    pub bloom: BloomFilterConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_writes_per_block: default_max_writes_per_block(),
            bloom: BloomFilterConfig::default(),
        }
    }
}

fn default_max_writes_per_block() -> usize {
    500
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Reconstruction strategy (default: bloom_accelerated)
    #[serde(default)]
    pub strategy: ReconstructionStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_config_defaults_from_empty_toml_like_json() {
        let config: LedgerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.max_writes_per_block, 500);
    }

    #[test]
    fn test_query_config_strategy_name() {
        let config: QueryConfig = serde_json::from_str(r#"{"strategy":"baseline"}"#).unwrap();
        assert_eq!(config.strategy, ReconstructionStrategy::Baseline);
        assert_eq!(
            QueryConfig::default().strategy,
            ReconstructionStrategy::BloomAccelerated
        );
    }
}
