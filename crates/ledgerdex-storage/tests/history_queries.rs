//! History query integration tests over the in-memory ledger.

use async_trait::async_trait;
use futures::StreamExt;
use ledgerdex_core::{LogicalTime, Record};
use ledgerdex_storage::store::{HistoryStream, KeyValueStream};
use ledgerdex_storage::{
    CommitReceipt, Error, HistoryOrder, HistoryQueryEngine, LedgerConfig, MemoryLedger,
    QueryConfig, ReconstructionStrategy, Result, VersionCount, VersionedStore,
};
use serde_json::{json, Map};
use std::sync::Arc;

/// Store whose history iterator yields newest first.
struct NewestFirstStore {
    inner: Arc<MemoryLedger>,
}

#[async_trait]
impl VersionedStore for NewestFirstStore {
    async fn put(&self, key: &str, value: Record) -> Result<CommitReceipt> {
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.inner.get(key).await
    }

    async fn range_scan(&self, start: &str, end: &str) -> Result<KeyValueStream> {
        self.inner.range_scan(start, end).await
    }

    async fn history_for_key(&self, key: &str) -> Result<HistoryStream> {
        let mut entries: Vec<_> = self.inner.history_for_key(key).await?.collect().await;
        entries.reverse();
        Ok(futures::stream::iter(entries).boxed())
    }

    fn history_order(&self) -> HistoryOrder {
        HistoryOrder::NewestFirst
    }
}

fn record(tag: &str) -> Record {
    let mut fields = Map::new();
    fields.insert("L_COMMENT".to_string(), json!(tag));
    Record::new("order", fields)
}

fn ledger(per_block: usize) -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::new(LedgerConfig {
        max_writes_per_block: per_block,
        ..Default::default()
    }))
}

fn engines(ledger: &Arc<MemoryLedger>) -> Vec<HistoryQueryEngine> {
    [ReconstructionStrategy::Baseline, ReconstructionStrategy::BloomAccelerated]
        .into_iter()
        .map(|strategy| {
            HistoryQueryEngine::with_blocks(ledger.clone(), ledger.clone(), QueryConfig { strategy })
        })
        .collect()
}

fn at(seconds: i64) -> LogicalTime {
    LogicalTime::from_seconds(seconds)
}

#[tokio::test]
async fn test_three_versions_of_one_order() {
    let ledger = ledger(2);
    ledger.put_at("91041", record("A"), at(1)).await.unwrap();
    ledger.put_at("11", record("noise"), at(2)).await.unwrap();
    ledger.put_at("91041", record("B"), at(3)).await.unwrap();
    ledger.put_at("91041", record("C"), at(4)).await.unwrap();
    ledger.seal_block().await;

    for engine in engines(&ledger) {
        let history = engine.full_history("91041").await.unwrap();
        let values: Vec<_> = history.iter().map(|e| e.value.clone()).collect();
        assert_eq!(values, vec![record("A"), record("B"), record("C")]);
        assert_eq!(
            history.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![at(1), at(3), at(4)]
        );

        let point = engine.point_query("91041", 1).await.unwrap();
        assert_eq!(point.value, record("B"));
        assert_eq!(point.timestamp, at(3));

        let range = engine.version_range_query("91041", 0, 2).await.unwrap();
        assert_eq!(range, history[0..2].to_vec());

        assert!(matches!(
            engine.point_query("91041", 3).await,
            Err(Error::VersionOutOfRange { version: 3, len: 3, .. })
        ));
    }
}

#[tokio::test]
async fn test_history_sorted_by_timestamp_not_commit_order() {
    let ledger = ledger(10);
    ledger.put_at("k", record("late"), at(30)).await.unwrap();
    ledger.put_at("k", record("early"), at(10)).await.unwrap();
    ledger.put_at("k", record("middle"), at(20)).await.unwrap();
    ledger.seal_block().await;

    for engine in engines(&ledger) {
        let history = engine.full_history("k").await.unwrap();
        assert_eq!(history[0].value, record("early"));
        assert_eq!(history[1].value, record("middle"));
        assert_eq!(history[2].value, record("late"));
    }
}

#[tokio::test]
async fn test_tied_timestamps_keep_commit_order() {
    let ledger = ledger(2);
    for tag in ["first", "second", "third"] {
        ledger.put_at("tie", record(tag), at(100)).await.unwrap();
    }
    ledger.seal_block().await;

    for engine in engines(&ledger) {
        let history = engine.full_history("tie").await.unwrap();
        let values: Vec<_> = history.into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec![record("first"), record("second"), record("third")]);
    }
}

#[tokio::test]
async fn test_tied_timestamps_agree_across_history_orders() {
    let ledger = ledger(2);
    for tag in ["first", "second", "third"] {
        ledger.put_at("tie", record(tag), at(100)).await.unwrap();
    }
    ledger.put_at("tie", record("earlier"), at(50)).await.unwrap();
    ledger.seal_block().await;

    let reversed: Arc<dyn VersionedStore> = Arc::new(NewestFirstStore {
        inner: ledger.clone(),
    });
    let baseline = HistoryQueryEngine::new(reversed.clone());
    let accelerated = HistoryQueryEngine::with_blocks(
        reversed,
        ledger.clone(),
        QueryConfig {
            strategy: ReconstructionStrategy::BloomAccelerated,
        },
    );

    let expected = vec![record("earlier"), record("first"), record("second"), record("third")];
    for engine in [baseline, accelerated] {
        let values: Vec<_> = engine
            .full_history("tie")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(values, expected, "strategy {}", engine.strategy());
    }
}

#[tokio::test]
async fn test_never_written_key_is_empty() {
    let ledger = ledger(10);
    ledger.put_at("a", record("x"), at(1)).await.unwrap();
    ledger.seal_block().await;

    for engine in engines(&ledger) {
        assert!(engine.full_history("missing").await.unwrap().is_empty());
        assert!(matches!(
            engine.point_query("missing", 0).await,
            Err(Error::VersionOutOfRange { len: 0, .. })
        ));
    }
}

#[tokio::test]
async fn test_version_range_clamps_and_rejects_inverted() {
    let ledger = ledger(10);
    for i in 0..4 {
        ledger.put_at("k", record(&i.to_string()), at(i)).await.unwrap();
    }
    ledger.seal_block().await;
    let engine = &engines(&ledger)[1];

    assert_eq!(engine.version_range_query("k", 2, 100).await.unwrap().len(), 2);
    assert!(engine.version_range_query("k", 10, 20).await.unwrap().is_empty());
    assert!(engine.version_range_query("k", 1, 1).await.unwrap().is_empty());
    assert!(matches!(
        engine.version_range_query("k", 3, 1).await,
        Err(Error::InvalidRange(_))
    ));
}

#[tokio::test]
async fn test_range_over_keys_in_scan_order() {
    let ledger = ledger(3);
    let writes = [("3", 1), ("1", 2), ("2", 3), ("1", 4), ("4", 5), ("2", 6)];
    for (key, t) in writes {
        ledger.put_at(key, record(key), at(t)).await.unwrap();
    }
    ledger.seal_block().await;

    for engine in engines(&ledger) {
        let result = engine.range_over_keys("1", "4").await.unwrap();
        let summary: Vec<_> = result.iter().map(|h| (h.key.as_str(), h.entries.len())).collect();
        assert_eq!(summary, vec![("1", 2), ("2", 2), ("3", 1)]);

        let everything = engine.range_over_keys("", "").await.unwrap();
        assert_eq!(everything.len(), 4);
    }
}

#[tokio::test]
async fn test_history_for_keys_keeps_caller_order() {
    let ledger = ledger(10);
    ledger.put_at("a", record("a"), at(1)).await.unwrap();
    ledger.put_at("b", record("b"), at(2)).await.unwrap();
    ledger.seal_block().await;

    let engine = &engines(&ledger)[1];
    let result = engine.history_for_keys(&["b", "zzz", "a"]).await.unwrap();
    let keys: Vec<_> = result.iter().map(|h| h.key.as_str()).collect();
    assert_eq!(keys, vec!["b", "zzz", "a"]);
    assert!(result[1].entries.is_empty());
}

#[tokio::test]
async fn test_paging() {
    let ledger = ledger(4);
    for i in 0..10 {
        ledger.put_at("k", record(&i.to_string()), at(i)).await.unwrap();
    }
    ledger.seal_block().await;
    let engine = &engines(&ledger)[1];

    let page = engine.history_page("k", 1, 4).await.unwrap();
    assert_eq!(page.len(), 4);
    assert_eq!(page[0].value, record("4"));
    assert_eq!(engine.history_page("k", 2, 4).await.unwrap().len(), 2);
    assert!(engine.history_page("k", 3, 4).await.unwrap().is_empty());

    let pages = engine.fetch_all_paged("k", 4).await.unwrap();
    assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

    let exact = engine.fetch_all_paged("k", 5).await.unwrap();
    assert_eq!(exact.iter().map(Vec::len).collect::<Vec<_>>(), vec![5, 5]);

    assert!(matches!(
        engine.history_page("k", 0, 0).await,
        Err(Error::InvalidRange(_))
    ));
}

#[tokio::test]
async fn test_block_range_query_honours_min_updates() {
    // Blocks: 0 genesis, 1 [a, b], 2 [a, a], 3 [b, c]
    let ledger = ledger(2);
    let writes = [("a", 1), ("b", 2), ("a", 3), ("a", 4), ("b", 5), ("c", 6)];
    for (key, t) in writes {
        ledger.put_at(key, record(key), at(t)).await.unwrap();
    }

    let engine = &engines(&ledger)[1];

    let all = engine.block_range_query(0, 100, 1).await.unwrap();
    let summary: Vec<_> = all.iter().map(|h| (h.key.as_str(), h.entries.len())).collect();
    assert_eq!(summary, vec![("a", 3), ("b", 2), ("c", 1)]);

    let busy = engine.block_range_query(1, 2, 2).await.unwrap();
    let summary: Vec<_> = busy.iter().map(|h| (h.key.as_str(), h.entries.len())).collect();
    assert_eq!(summary, vec![("a", 3)]);

    assert!(engine.block_range_query(50, 60, 0).await.unwrap().is_empty());
    assert!(matches!(
        engine.block_range_query(3, 1, 1).await,
        Err(Error::InvalidRange(_))
    ));
}

#[tokio::test]
async fn test_block_range_requires_block_source() {
    let ledger = ledger(2);
    let engine = HistoryQueryEngine::new(ledger);
    assert!(matches!(
        engine.block_range_query(0, 1, 1).await,
        Err(Error::NoBlockSource)
    ));
}

#[tokio::test]
async fn test_current_state() {
    let ledger = ledger(10);
    ledger.put_at("k", record("old"), at(1)).await.unwrap();
    ledger.put_at("k", record("new"), at(2)).await.unwrap();
    ledger.seal_block().await;

    let engine = &engines(&ledger)[0];
    assert_eq!(engine.current_state("k").await.unwrap(), record("new"));
    assert!(matches!(
        engine.current_state("nope").await,
        Err(Error::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_state_range_returns_current_values_in_key_order() {
    let ledger = ledger(2);
    let writes = [("3", "c1"), ("1", "a1"), ("2", "b1"), ("1", "a2"), ("4", "d1")];
    for (t, (key, tag)) in writes.into_iter().enumerate() {
        ledger.put_at(key, record(tag), at(t as i64)).await.unwrap();
    }
    ledger.seal_block().await;

    let engine = &engines(&ledger)[0];
    let bounded = engine.state_range("1", "4").await.unwrap();
    assert_eq!(
        bounded,
        vec![
            ("1".to_string(), record("a2")),
            ("2".to_string(), record("b1")),
            ("3".to_string(), record("c1")),
        ]
    );

    let all = engine.state_range("", "").await.unwrap();
    let keys: Vec<_> = all.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["1", "2", "3", "4"]);

    assert_eq!(engine.state_range("2", "").await.unwrap().len(), 3);
    assert!(engine.state_range("5", "9").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_version_counts_and_ordered_range() {
    let ledger = ledger(3);
    let writes = [("1", 1), ("2", 2), ("2", 3), ("3", 4), ("3", 5), ("3", 6)];
    for (key, t) in writes {
        ledger.put_at(key, record(key), at(t)).await.unwrap();
    }
    ledger.seal_block().await;

    let engine = &engines(&ledger)[1];
    let counts = engine.version_counts("", "").await.unwrap();
    assert_eq!(
        counts,
        vec![
            VersionCount { key: "1".into(), versions: 1 },
            VersionCount { key: "2".into(), versions: 2 },
            VersionCount { key: "3".into(), versions: 3 },
        ]
    );

    let start = ledgerdex_storage::find_key_window(&counts, 2, 5, 5).unwrap();
    assert_eq!(start, 1);

    let keys: Vec<String> = counts.into_iter().map(|c| c.key).collect();
    let histories = engine.ordered_key_range(&keys, &keys[start], 2).await.unwrap();
    assert_eq!(histories.len(), 2);
    assert_eq!(histories[1].entries.len(), 3);

    assert!(matches!(
        engine.ordered_key_range(&keys, "9", 2).await,
        Err(Error::KeyNotFound(_))
    ));
}
