//! LedgerDex Storage Layer
//!
//! Everything on the read side of the ledger: the bloom filter index built
//! per block, the collaborator traits the rest of the workspace consumes, a
//! reference in-memory ledger, and the history query engine.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────┐
//! │  HistoryQueryEngine   │  full_history, point_query, version_range_query,
//! │                       │  range_over_keys, block_range_query, ...
//! └──────────┬────────────┘
//!            │ reconstruct(key)
//!            ▼
//! ┌───────────────────────┐      may_contain(key)?   ┌──────────────┐
//! │    Reconstructor      │ ───────────────────────► │ BloomFilter  │
//! │  baseline │ bloom     │                          └──────────────┘
//! └─────┬───────────┬─────┘
//!       │           │
//!       ▼           ▼
//! ┌───────────┐ ┌───────────┐
//! │ Versioned │ │  Block    │   ◄── implemented by MemoryLedger
//! │  Store    │ │  Source   │
//! └───────────┘ └───────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ledgerdex_storage::{HistoryQueryEngine, MemoryLedger, QueryConfig, VersionedStore};
//!
//! let ledger = Arc::new(MemoryLedger::default());
//! ledger.put("91041", record).await?;
//! ledger.seal_block().await;
//!
//! let engine = HistoryQueryEngine::with_blocks(ledger.clone(), ledger, QueryConfig::default());
//! let history = engine.full_history("91041").await?;
//! let second = engine.point_query("91041", 1).await?;
//! ```

pub mod analysis;
pub mod bloom;
pub mod config;
pub mod error;
pub mod memory;
pub mod query;
pub mod reconstruct;
pub mod store;

pub use analysis::{find_key_window, ordered_key_range, VersionCount};
pub use bloom::{BloomFilter, BloomFilterConfig, BloomFilterStats};
pub use config::{LedgerConfig, QueryConfig};
pub use error::{Error, Result};
pub use memory::MemoryLedger;
pub use query::{HistoryQueryEngine, KeyHistory};
pub use reconstruct::{ReconstructionSession, ReconstructionStrategy, Reconstructor};
pub use store::{BlockSource, CommitReceipt, HistoryOrder, VersionedStore};
