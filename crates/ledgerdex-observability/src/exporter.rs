use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// Render every registered metric in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => String::from_utf8_lossy(&buffer).into_owned(),
        Err(e) => format!("# failed to encode metrics: {}\n", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{init, INGEST_WAVES_TOTAL};

    #[test]
    fn test_gather_text_contains_registered_metric() {
        init();
        INGEST_WAVES_TOTAL.inc();

        let text = gather_text();
        assert!(text.contains("ledgerdex_ingest_waves_total"));
    }
}
