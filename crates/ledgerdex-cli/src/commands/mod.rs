pub mod ingest;
pub mod query;

pub use ingest::{handle_ingest, IngestArgs};
pub use query::{handle_query_command, QueryCommand};

use crate::config::{Config, OutputFormat};
use anyhow::{Context, Result};
use ledgerdex_storage::{HistoryQueryEngine, MemoryLedger};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened ledger plus the settings a command runs with.
pub struct Session {
    pub ledger: Arc<MemoryLedger>,
    pub ledger_path: PathBuf,
    pub config: Config,
    pub format: OutputFormat,
}

impl Session {
    pub async fn open(ledger_path: &Path, config: Config, format: OutputFormat) -> Result<Self> {
        let ledger = MemoryLedger::open(ledger_path, config.ledger.clone())
            .await
            .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

        Ok(Self {
            ledger: Arc::new(ledger),
            ledger_path: ledger_path.to_path_buf(),
            config,
            format,
        })
    }

    pub fn engine(&self) -> HistoryQueryEngine {
        HistoryQueryEngine::with_blocks(
            self.ledger.clone(),
            self.ledger.clone(),
            self.config.query.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdex_storage::ReconstructionStrategy;
    use std::io::Write;

    const LINEITEMS: &str = r#"{"table": [
        {"L_ORDERKEY": 91041, "L_QUANTITY": 1},
        {"L_ORDERKEY": 5, "L_QUANTITY": 9},
        {"L_ORDERKEY": 91041, "L_QUANTITY": 2},
        {"L_ORDERKEY": 91041, "L_QUANTITY": 3},
        {"L_QUANTITY": 4}
    ]}"#;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.ingest.wave_delay_ms = 0;
        config.ingest.chunk_size = 2;
        config.ingest.wave_size = 1;
        config
    }

    async fn ingested(dir: &Path, format: OutputFormat) -> (Session, String) {
        let input = dir.join("lineitem.json");
        std::fs::File::create(&input)
            .unwrap()
            .write_all(LINEITEMS.as_bytes())
            .unwrap();

        let session = Session::open(&dir.join("ledger.json"), fast_config(), format)
            .await
            .unwrap();
        let args = IngestArgs {
            file: input,
            source_format: ledgerdex_client::SourceFormat::Auto,
            chunk_size: None,
            wave_size: None,
            wave_delay_ms: None,
            key_policy: None,
            retries: None,
        };
        let out = handle_ingest(args, &session).await.unwrap();
        (session, out)
    }

    #[tokio::test]
    async fn test_ingest_reports_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (_, out) = ingested(dir.path(), OutputFormat::Json).await;

        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["succeeded"], 4);
        assert_eq!(report["failed"][0]["index"], 4);
        assert_eq!(report["failed"][0]["kind"], "key_derivation");
        assert_eq!(report["waves_dispatched"], 3);

        let reopened = Session::open(&dir.path().join("ledger.json"), fast_config(), OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(reopened.ledger.all_writes().await.len(), 4);
    }

    #[tokio::test]
    async fn test_history_through_both_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = ingested(dir.path(), OutputFormat::Json).await;

        for strategy in [ReconstructionStrategy::Baseline, ReconstructionStrategy::BloomAccelerated] {
            session.config.query.strategy = strategy;
            let out = handle_query_command(
                QueryCommand::History {
                    key: "91041".to_string(),
                },
                &session,
            )
            .await
            .unwrap();
            let entries: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
            let quantities: Vec<i64> = entries
                .iter()
                .map(|e| e["value"]["L_QUANTITY"].as_i64().unwrap())
                .collect();
            assert_eq!(quantities, vec![1, 2, 3], "strategy {}", strategy);
        }
    }

    #[tokio::test]
    async fn test_point_out_of_range_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = ingested(dir.path(), OutputFormat::Text).await;

        let err = handle_query_command(
            QueryCommand::Point {
                key: "91041".to_string(),
                version: 3,
            },
            &session,
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"));
    }

    #[tokio::test]
    async fn test_counts_text_and_window() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = ingested(dir.path(), OutputFormat::Text).await;

        let counts = handle_query_command(
            QueryCommand::Counts {
                start_key: String::new(),
                end_key: String::new(),
            },
            &session,
        )
        .await
        .unwrap();
        assert_eq!(counts, "5 1\n91041 3");

        let window = handle_query_command(
            QueryCommand::Window {
                size: 1,
                min: 2,
                max: 3,
                counts_file: None,
            },
            &session,
        )
        .await
        .unwrap();
        assert!(window.starts_with("Window at index 1 (total 3)"));
    }

    #[tokio::test]
    async fn test_scan_lists_current_values() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = ingested(dir.path(), OutputFormat::Json).await;

        let out = handle_query_command(
            QueryCommand::Scan {
                start_key: String::new(),
                end_key: String::new(),
            },
            &session,
        )
        .await
        .unwrap();
        let states: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0]["key"], "5");
        assert_eq!(states[1]["key"], "91041");
        assert_eq!(states[1]["value"]["L_QUANTITY"], 3);
    }

    #[tokio::test]
    async fn test_far_page_is_empty_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = ingested(dir.path(), OutputFormat::Text).await;

        let out = handle_query_command(
            QueryCommand::Pages {
                key: "91041".to_string(),
                page_size: usize::MAX,
                page: Some(usize::MAX),
            },
            &session,
        )
        .await
        .unwrap();
        assert_eq!(out, "No versions found");
    }

    #[tokio::test]
    async fn test_blocks_listing() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = ingested(dir.path(), OutputFormat::Text).await;

        let out = handle_query_command(QueryCommand::Blocks, &session)
            .await
            .unwrap();
        assert!(out.starts_with("Blocks (2):"));
    }
}
