//! Per-Record Retry with Exponential Backoff
//!
//! Ingestion does not retry by default: a failed record is reported and the
//! batch moves on. A caller that wants retries configures a [`RetryPolicy`]
//! and every record write is then wrapped in [`retry_with_backoff`].
//!
//! ```text
//! Attempt 1: immediate
//! Attempt 2: wait initial_backoff
//! Attempt 3: wait initial_backoff × multiplier
//! ...        capped at max_backoff
//! ```
//!
//! ## Retryable vs Non-Retryable Errors
//!
//! **Retryable**: `StoreUnavailable`, `Rejected`, `Timeout`
//!
//! **Non-retryable**: everything else, including key derivation failures,
//! which no amount of waiting will fix.
//!
//! ## Jitter
//!
//! With `jitter` set, each backoff is scaled by a random factor in
//! `[0.75, 1.25)` so writers that failed together do not retry together.

use ledgerdex_storage::Error as StorageError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for record writes.
///
/// ```text
/// backoff = min(initial_backoff × multiplier^attempt, max_backoff)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First backoff in milliseconds (default: 100)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds (default: 30000)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between attempts (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Randomize each backoff by ±25% (default: true)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-indexed), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms.min(self.max_backoff_ms as f64) as u64)
    }

    /// Backoff with jitter applied when enabled.
    pub fn jittered_backoff(&self, attempt: usize) -> Duration {
        let backoff = self.backoff(attempt);
        if !self.jitter {
            return backoff;
        }
        let factor = 0.75 + rand::random::<f64>() * 0.5;
        Duration::from_secs_f64(backoff.as_secs_f64() * factor)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's retries are used up.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Write succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %err,
                        "Max retries exhausted, giving up"
                    );
                    return Err(err);
                }

                let backoff = policy.jittered_backoff(attempt);
                debug!(
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retryable write error, backing off"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
