//! History query commands.

use super::Session;
use crate::format::{self, render};
use anyhow::{Context, Result};
use clap::Subcommand;
use ledgerdex_storage::analysis::{format_counts, parse_counts};
use ledgerdex_storage::{find_key_window, VersionCount};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    /// Every version of a key, oldest first
    History {
        key: String,
    },
    /// One version of a key (zero-based)
    Point {
        key: String,
        version: usize,
    },
    /// Versions [start, end) of a key
    Versions {
        key: String,
        start: usize,
        end: usize,
    },
    /// Full history of every current key in [start_key, end_key)
    Range {
        /// First key (empty for unbounded)
        #[arg(default_value = "")]
        start_key: String,
        /// Exclusive end key (empty for unbounded)
        #[arg(default_value = "")]
        end_key: String,
    },
    /// Full history of each listed key, in the order given
    Keys {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// A key's versions split into pages
    Pages {
        key: String,
        /// Versions per page
        #[arg(long, default_value = "10")]
        page_size: usize,
        /// Only this page (zero-based); all pages when omitted
        #[arg(long)]
        page: Option<usize>,
    },
    /// Keys updated at least MIN_UPDATES times within blocks [start, end]
    BlockRange {
        start: u64,
        end: u64,
        #[arg(long, default_value = "1")]
        min_updates: usize,
    },
    /// Current value of a key
    State {
        key: String,
    },
    /// Current value of every key in [start_key, end_key)
    Scan {
        /// First key (empty for unbounded)
        #[arg(default_value = "")]
        start_key: String,
        /// Exclusive end key (empty for unbounded)
        #[arg(default_value = "")]
        end_key: String,
    },
    /// Version count per current key, as `key count` lines
    Counts {
        #[arg(default_value = "")]
        start_key: String,
        #[arg(default_value = "")]
        end_key: String,
    },
    /// First window of consecutive keys whose version total is in [min, max]
    Window {
        /// Keys per window
        #[arg(long)]
        size: usize,
        #[arg(long)]
        min: usize,
        #[arg(long)]
        max: usize,
        /// Read counts from a `key count` file instead of the ledger
        #[arg(long)]
        counts_file: Option<PathBuf>,
    },
    /// Histories of SIZE keys from a sorted key list, starting at START_KEY
    Ordered {
        start_key: String,
        size: usize,
        /// Key list, one per line; current keys when omitted
        #[arg(long)]
        keys_file: Option<PathBuf>,
    },
    /// List sealed blocks
    Blocks,
}

#[derive(Debug, Serialize)]
struct WindowResult {
    start: Option<usize>,
    keys: Vec<VersionCount>,
    total: usize,
}

pub async fn handle_query_command(command: QueryCommand, session: &Session) -> Result<String> {
    let engine = session.engine();
    let fmt = session.format;

    match command {
        QueryCommand::History { key } => {
            let entries = engine
                .full_history(&key)
                .await
                .with_context(|| format!("Failed to read history of '{}'", key))?;
            render(fmt, entries.as_slice(), format::entries_text)
        }
        QueryCommand::Point { key, version } => {
            let entry = engine
                .point_query(&key, version)
                .await
                .with_context(|| format!("Failed to read version {} of '{}'", version, key))?;
            render(fmt, &entry, |e| format::entry_line(version, e))
        }
        QueryCommand::Versions { key, start, end } => {
            let entries = engine
                .version_range_query(&key, start, end)
                .await
                .with_context(|| format!("Failed to read versions {}..{} of '{}'", start, end, key))?;
            render(fmt, entries.as_slice(), |e| format::entries_from(e, start))
        }
        QueryCommand::Range { start_key, end_key } => {
            let histories = engine
                .range_over_keys(&start_key, &end_key)
                .await
                .context("Failed to scan key range")?;
            render(fmt, histories.as_slice(), format::histories_text)
        }
        QueryCommand::Keys { keys } => {
            let histories = engine
                .history_for_keys(&keys)
                .await
                .context("Failed to read key histories")?;
            render(fmt, histories.as_slice(), format::histories_text)
        }
        QueryCommand::Pages {
            key,
            page_size,
            page: Some(page),
        } => {
            let entries = engine
                .history_page(&key, page, page_size)
                .await
                .with_context(|| format!("Failed to read page {} of '{}'", page, key))?;
            render(fmt, entries.as_slice(), |e| {
                format::entries_from(e, page.saturating_mul(page_size))
            })
        }
        QueryCommand::Pages {
            key,
            page_size,
            page: None,
        } => {
            let pages = engine
                .fetch_all_paged(&key, page_size)
                .await
                .with_context(|| format!("Failed to page through '{}'", key))?;
            render(fmt, pages.as_slice(), |p| format::pages_text(p, page_size))
        }
        QueryCommand::BlockRange {
            start,
            end,
            min_updates,
        } => {
            let histories = engine
                .block_range_query(start, end, min_updates)
                .await
                .with_context(|| format!("Failed to read blocks {}..={}", start, end))?;
            render(fmt, histories.as_slice(), format::histories_text)
        }
        QueryCommand::State { key } => {
            let record = engine
                .current_state(&key)
                .await
                .with_context(|| format!("Failed to read current state of '{}'", key))?;
            render(fmt, &record, format::record_json)
        }
        QueryCommand::Scan { start_key, end_key } => {
            let pairs = engine
                .state_range(&start_key, &end_key)
                .await
                .context("Failed to scan current state")?;
            let states = format::key_states(&pairs);
            render(fmt, states.as_slice(), format::states_text)
        }
        QueryCommand::Counts { start_key, end_key } => {
            let counts = engine
                .version_counts(&start_key, &end_key)
                .await
                .context("Failed to count versions")?;
            render(fmt, counts.as_slice(), |c| format_counts(c).trim_end().to_string())
        }
        QueryCommand::Window {
            size,
            min,
            max,
            counts_file,
        } => {
            let mut counts = match counts_file {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    parse_counts(&text)
                        .with_context(|| format!("Invalid counts file {}", path.display()))?
                }
                None => engine
                    .version_counts("", "")
                    .await
                    .context("Failed to count versions")?,
            };

            let start = find_key_window(&counts, size, min, max);
            counts.sort_by(|a, b| a.key.cmp(&b.key));
            let keys: Vec<VersionCount> = match start {
                Some(i) => counts.into_iter().skip(i).take(size).collect(),
                None => Vec::new(),
            };
            let result = WindowResult {
                start,
                total: keys.iter().map(|c| c.versions).sum(),
                keys,
            };

            render(fmt, &result, |r| match r.start {
                Some(i) => format!(
                    "Window at index {} (total {})\n{}",
                    i,
                    r.total,
                    format_counts(&r.keys).trim_end()
                ),
                None => "No window matches".to_string(),
            })
        }
        QueryCommand::Ordered {
            start_key,
            size,
            keys_file,
        } => {
            let keys: Vec<String> = match keys_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect(),
                None => engine
                    .version_counts("", "")
                    .await
                    .context("Failed to list keys")?
                    .into_iter()
                    .map(|c| c.key)
                    .collect(),
            };

            let histories = engine
                .ordered_key_range(&keys, &start_key, size)
                .await
                .with_context(|| format!("Failed to read {} keys from '{}'", size, start_key))?;
            render(fmt, histories.as_slice(), format::histories_text)
        }
        QueryCommand::Blocks => {
            let blocks = session.ledger.block_infos().await;
            render(fmt, blocks.as_slice(), format::blocks_text)
        }
    }
}
