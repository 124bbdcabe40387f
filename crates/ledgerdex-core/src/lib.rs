//! LedgerDex Core
//!
//! Shared data model for the LedgerDex workspace. Every other crate speaks in
//! these types:
//!
//! - [`Record`]: a flat JSON document tagged with a `docType`
//! - [`OrderKey`] / [`KeyPolicy`]: the one place ledger keys are derived
//! - [`HistoryEntry`] / [`LogicalTime`]: one immutable version of a key
//! - [`Block`] / [`WriteRecord`]: a sealed unit of committed writes

pub mod block;
pub mod error;
pub mod history;
pub mod record;

pub use block::{Block, BlockInfo, WriteRecord};
pub use error::{Error, Result};
pub use history::{HistoryEntry, LogicalTime, NativeHistoryEntry};
pub use record::{KeyPolicy, OrderKey, Record};
