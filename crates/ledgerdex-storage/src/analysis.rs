//! Version Analysis
//!
//! Helpers for choosing benchmark key ranges from per-key version counts.
//!
//! A count file lists one key per line followed by its version count,
//! sorted by key:
//!
//! ```text
//! 0x00a1 12
//! 0x00b7 3
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Number of versions stored under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCount {
    pub key: String,
    pub versions: usize,
}

/// First index of a window of `window_size` consecutive counts, taken in key
/// order, whose version total lies in `[min_total, max_total]`.
///
/// `counts` is sorted by key before the search; the returned index refers
/// to that sorted order. Returns `None` when no window qualifies or
/// `window_size` is zero.
pub fn find_key_window(
    counts: &[VersionCount],
    window_size: usize,
    min_total: usize,
    max_total: usize,
) -> Option<usize> {
    if window_size == 0 || counts.len() < window_size {
        return None;
    }

    let mut sorted: Vec<&VersionCount> = counts.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut total: usize = sorted[..window_size].iter().map(|c| c.versions).sum();
    for start in 0..=sorted.len() - window_size {
        if start > 0 {
            total = total - sorted[start - 1].versions + sorted[start + window_size - 1].versions;
        }
        if (min_total..=max_total).contains(&total) {
            return Some(start);
        }
    }
    None
}

/// `range_size` keys from the sorted list `keys`, starting at `start_key`.
///
/// Fewer keys are returned when the list ends first.
pub fn ordered_key_range<K: AsRef<str>>(
    keys: &[K],
    start_key: &str,
    range_size: usize,
) -> Result<Vec<String>> {
    let start = keys
        .iter()
        .position(|k| k.as_ref() == start_key)
        .ok_or_else(|| Error::KeyNotFound(start_key.to_string()))?;

    Ok(keys[start..]
        .iter()
        .take(range_size)
        .map(|k| k.as_ref().to_string())
        .collect())
}

/// Render counts in the `key count` line format.
pub fn format_counts(counts: &[VersionCount]) -> String {
    let mut out = String::new();
    for count in counts {
        let _ = writeln!(out, "{} {}", count.key, count.versions);
    }
    out
}

/// Parse the `key count` line format. Blank lines are ignored.
pub fn parse_counts(text: &str) -> Result<Vec<VersionCount>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(versions), None) => {
                    let versions = versions.parse().map_err(|_| {
                        Error::InvalidRange(format!(
                            "line {}: version count '{}' is not a number",
                            n + 1,
                            versions
                        ))
                    })?;
                    Ok(VersionCount {
                        key: key.to_string(),
                        versions,
                    })
                }
                _ => Err(Error::InvalidRange(format!(
                    "line {}: expected '<key> <count>'",
                    n + 1
                ))),
            }
        })
        .collect()
}
