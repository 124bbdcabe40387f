//! Property tests: bloom filters never miss, and both reconstruction paths
//! agree on every ledger.

use ledgerdex_core::{LogicalTime, Record};
use ledgerdex_storage::bloom::{false_positive_rate, optimal_params};
use ledgerdex_storage::{
    BloomFilter, BloomFilterConfig, HistoryQueryEngine, LedgerConfig, MemoryLedger, QueryConfig,
    ReconstructionStrategy,
};
use proptest::prelude::*;
use serde_json::{json, Map};
use std::collections::HashSet;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_no_false_negatives(
        keys in prop::collection::hash_set("[a-z0-9]{1,12}", 1..200),
        bits in 8u64..4096,
        hashes in 1u32..12,
    ) {
        let filter = BloomFilter::build(keys.iter(), bits, hashes);
        for key in &keys {
            prop_assert!(filter.may_contain(key.as_bytes()));
        }

        let restored = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
        for key in &keys {
            prop_assert!(restored.may_contain(key.as_bytes()));
        }
    }

    #[test]
    fn prop_sized_filter_no_false_negatives(
        keys in prop::collection::vec("0x[0-9a-f]{8}", 0..300),
    ) {
        let filter = BloomFilter::for_keys(&keys, &BloomFilterConfig::default());
        for key in &keys {
            prop_assert!(filter.may_contain(key.as_bytes()));
        }
    }

    #[test]
    fn prop_paths_equivalent(
        writes in prop::collection::vec((0u8..8, 0i64..50), 0..60),
        per_block in 1usize..6,
    ) {
        runtime().block_on(async {
            let ledger = Arc::new(MemoryLedger::new(LedgerConfig {
                max_writes_per_block: per_block,
                ..Default::default()
            }));
            for (i, (key, seconds)) in writes.iter().enumerate() {
                let mut fields = Map::new();
                fields.insert("seq".to_string(), json!(i));
                ledger
                    .put_at(&key.to_string(), Record::new("order", fields), LogicalTime::from_seconds(*seconds))
                    .await
                    .unwrap();
            }
            ledger.seal_block().await;

            let baseline = HistoryQueryEngine::with_blocks(
                ledger.clone(),
                ledger.clone(),
                QueryConfig { strategy: ReconstructionStrategy::Baseline },
            );
            let accelerated = HistoryQueryEngine::with_blocks(
                ledger.clone(),
                ledger.clone(),
                QueryConfig { strategy: ReconstructionStrategy::BloomAccelerated },
            );

            for key in 0u8..10 {
                let key = key.to_string();
                let a = baseline.full_history(&key).await.unwrap();
                let b = accelerated.full_history(&key).await.unwrap();
                assert_eq!(a, b);
                assert!(a.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            }
        });
    }
}

#[test]
fn test_empirical_false_positive_rate_within_bound() {
    let config = BloomFilterConfig::default();
    let members: Vec<String> = (0..2000).map(|i| format!("member-{}", i)).collect();
    let filter = BloomFilter::for_keys(&members, &config);

    let member_set: HashSet<&str> = members.iter().map(String::as_str).collect();
    let probes = 20_000;
    let mut positives = 0;
    for i in 0..probes {
        let probe = format!("probe-{}", i);
        assert!(!member_set.contains(probe.as_str()));
        if filter.may_contain(probe.as_bytes()) {
            positives += 1;
        }
    }

    let (bits, hashes) = optimal_params(members.len(), &config);
    let expected = false_positive_rate(bits, hashes, members.len() as u64);
    let observed = positives as f64 / probes as f64;

    // Generous slack over the analytic rate for sampling noise
    assert!(
        observed <= expected * 2.0 + 0.005,
        "observed {} expected {}",
        observed,
        expected
    );
}
