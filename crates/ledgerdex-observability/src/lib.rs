//! LedgerDex Observability
//!
//! Provides Prometheus metrics for LedgerDex.
//!
//! # Usage
//!
//! ```no_run
//! use ledgerdex_observability::{metrics, gather_text};
//!
//! metrics::init();
//! metrics::INGEST_WAVES_TOTAL.inc();
//!
//! println!("{}", gather_text());
//! ```

pub mod exporter;
pub mod metrics;

pub use exporter::gather_text;
pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_panic() {
        init();
    }

    #[test]
    fn test_double_init_is_safe() {
        init();
        init_metrics();
    }
}
