//! Output rendering for ledgerctl
//!
//! - JSON: pretty-printed, machine-readable
//! - Text: one line per history entry, blank line between keys

use crate::config::OutputFormat;
use anyhow::Result;
use ledgerdex_client::IngestionReport;
use ledgerdex_core::{BlockInfo, HistoryEntry, Record};
use ledgerdex_storage::KeyHistory;
use serde::Serialize;
use std::fmt::Write;

/// Render `value` as JSON, or with `text` for text output.
pub fn render<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Text => Ok(text(value)),
    }
}

pub fn entry_line(version: usize, entry: &HistoryEntry) -> String {
    format!(
        "{:>4}  {}  {}  {}",
        version,
        entry.timestamp,
        entry.commit_id,
        record_json(&entry.value)
    )
}

pub fn entries_text(entries: &[HistoryEntry]) -> String {
    entries_from(entries, 0)
}

/// Lines for `entries` numbered from `first_version`
pub fn entries_from(entries: &[HistoryEntry], first_version: usize) -> String {
    if entries.is_empty() {
        return "No versions found".to_string();
    }
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "{}", entry_line(first_version.saturating_add(i), entry));
    }
    out.trim_end().to_string()
}

pub fn histories_text(histories: &[KeyHistory]) -> String {
    if histories.is_empty() {
        return "No keys found".to_string();
    }
    histories
        .iter()
        .map(|h| format!("{} ({} versions)\n{}", h.key, h.entries.len(), entries_text(&h.entries)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn pages_text(pages: &[Vec<HistoryEntry>], page_size: usize) -> String {
    if pages.is_empty() {
        return "No versions found".to_string();
    }
    pages
        .iter()
        .enumerate()
        .map(|(n, page)| format!("page {}\n{}", n, entries_from(page, n.saturating_mul(page_size))))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn blocks_text(blocks: &[BlockInfo]) -> String {
    let mut out = format!("Blocks ({}):", blocks.len());
    for block in blocks {
        let span = match (block.first_timestamp, block.last_timestamp) {
            (Some(first), Some(last)) => format!("{} .. {}", first, last),
            _ => "empty".to_string(),
        };
        let _ = write!(
            out,
            "\n  #{:<6} {:>6} writes  {:>6} filter bytes  {}",
            block.number, block.write_count, block.filter_bytes, span
        );
    }
    out
}

pub fn report_text(report: &IngestionReport) -> String {
    let mut out = String::new();
    let status = if report.cancelled { "cancelled" } else { "finished" };
    let _ = writeln!(out, "Ingestion {}:", status);
    let _ = writeln!(out, "  Records:    {}", report.total_records);
    let _ = writeln!(out, "  Attempted:  {}", report.attempted);
    let _ = writeln!(out, "  Succeeded:  {}", report.succeeded);
    let _ = writeln!(out, "  Failed:     {}", report.failed.len());
    let _ = writeln!(out, "  Waves:      {}", report.waves_dispatched);
    let _ = writeln!(
        out,
        "  Wave delay: {}ms (final)",
        report.final_wave_delay.as_millis()
    );
    let _ = write!(out, "  Elapsed:    {:.3}s", report.elapsed.as_secs_f64());
    for failure in &report.failed {
        let _ = write!(
            out,
            "\n  ! record {} key={} {}: {}",
            failure.index,
            failure.key.as_deref().unwrap_or("-"),
            failure.kind,
            failure.message
        );
    }
    out
}

/// A key and its current value, as `scan` prints it.
#[derive(Debug, Serialize)]
pub struct KeyState<'a> {
    pub key: &'a str,
    pub value: &'a Record,
}

pub fn key_states(pairs: &[(String, Record)]) -> Vec<KeyState<'_>> {
    pairs
        .iter()
        .map(|(key, value)| KeyState { key, value })
        .collect()
}

pub fn states_text(states: &[KeyState<'_>]) -> String {
    if states.is_empty() {
        return "No keys found".to_string();
    }
    states
        .iter()
        .map(|s| format!("{}  {}", s.key, record_json(s.value)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn record_json(record: &Record) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| "<unprintable>".to_string())
}
