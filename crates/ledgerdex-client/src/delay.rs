//! Adaptive Inter-Wave Delay
//!
//! The configured wave delay `D` is a floor, not a constant. After each wave
//! the pipeline reports how many writes were rejected or timed out:
//!
//! ```text
//! backpressure ≥ threshold  →  delay = min(delay × multiplier, max_delay)
//! clean wave                →  delay = max(delay ÷ multiplier, base)
//! ```
//!
//! A threshold of zero turns adaptation off and the delay stays at `D`.

use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AdaptiveDelay {
    base: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    threshold: usize,
}

impl AdaptiveDelay {
    pub fn new(base: Duration, max: Duration, multiplier: f64, threshold: usize) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            base,
            current: base,
            max: max.max(base),
            multiplier,
            threshold,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Fold one wave's backpressure count into the delay and return the
    /// delay before the next wave.
    pub fn observe(&mut self, backpressure: usize) -> Duration {
        if self.threshold == 0 {
            return self.current;
        }

        let previous = self.current;
        if backpressure >= self.threshold {
            self.current = self.scale(self.multiplier).min(self.max);
            // A zero base never grows by multiplication
            if self.current.is_zero() && !self.max.is_zero() {
                self.current = Duration::from_millis(100).min(self.max);
            }
            warn!(
                backpressure,
                previous_ms = previous.as_millis() as u64,
                delay_ms = self.current.as_millis() as u64,
                "Ledger pushing back, increasing wave delay"
            );
        } else if self.current > self.base {
            self.current = self.scale(1.0 / self.multiplier).max(self.base);
            debug!(
                previous_ms = previous.as_millis() as u64,
                delay_ms = self.current.as_millis() as u64,
                "Clean wave, decaying wave delay"
            );
        }

        self.current
    }

    fn scale(&self, factor: f64) -> Duration {
        Duration::from_secs_f64((self.current.as_secs_f64() * factor).min(self.max.as_secs_f64()))
    }
}
