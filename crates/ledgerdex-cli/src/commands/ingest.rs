//! Bulk ingestion command.

use super::Session;
use crate::format::{self, render};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use ledgerdex_client::{
    install_signal_handler, load_records, IngestPipeline, RetryPolicy, ShutdownHandle,
    SourceFormat,
};
use ledgerdex_core::KeyPolicy;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyPolicyArg {
    /// `L_ORDERKEY`
    OrderKey,
    /// `L_ORDERKEY-L_LINENUMBER`
    OrderLine,
    /// Lower-cased `from` address
    Sender,
}

impl From<KeyPolicyArg> for KeyPolicy {
    fn from(arg: KeyPolicyArg) -> Self {
        match arg {
            KeyPolicyArg::OrderKey => KeyPolicy::OrderKey,
            KeyPolicyArg::OrderLine => KeyPolicy::OrderLine,
            KeyPolicyArg::Sender => KeyPolicy::Sender,
        }
    }
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// JSON file of records or blocks
    pub file: PathBuf,

    /// Input layout: auto, records, or block_stream
    #[arg(long, default_value = "auto")]
    pub source_format: SourceFormat,

    /// Records per chunk
    #[arg(long, env = "LEDGERDEX_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Chunks per wave
    #[arg(long, env = "LEDGERDEX_WAVE_SIZE")]
    pub wave_size: Option<usize>,

    /// Delay between wave starts in milliseconds
    #[arg(long, env = "LEDGERDEX_WAVE_DELAY_MS")]
    pub wave_delay_ms: Option<u64>,

    /// How records are keyed
    #[arg(long, value_enum)]
    pub key_policy: Option<KeyPolicyArg>,

    /// Retry each failed write up to N times
    #[arg(long)]
    pub retries: Option<usize>,
}

pub async fn handle_ingest(args: IngestArgs, session: &Session) -> Result<String> {
    let mut config = session.config.ingest.clone();
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(wave_size) = args.wave_size {
        config.wave_size = wave_size;
    }
    if let Some(wave_delay_ms) = args.wave_delay_ms {
        config.wave_delay_ms = wave_delay_ms;
    }
    if let Some(policy) = args.key_policy {
        config.key_policy = policy.into();
    }
    if let Some(retries) = args.retries {
        config.retry = Some(RetryPolicy {
            max_retries: retries,
            ..config.retry.take().unwrap_or_default()
        });
    }

    let records = load_records(&args.file, args.source_format)
        .await
        .with_context(|| format!("Failed to load records from {}", args.file.display()))?;
    info!(
        file = %args.file.display(),
        records = records.len(),
        key_policy = %config.key_policy,
        "Loaded input"
    );

    let shutdown = ShutdownHandle::new();
    let signals = install_signal_handler(shutdown.clone());

    let report = IngestPipeline::new(session.ledger.clone(), config)
        .with_shutdown(shutdown)
        .ingest(records)
        .await
        .context("Ingestion could not start")?;
    signals.abort();

    if let Some(block) = session.ledger.seal_block().await {
        info!(block, "Sealed final block");
    }
    session
        .ledger
        .save(&session.ledger_path)
        .await
        .with_context(|| format!("Failed to save ledger to {}", session.ledger_path.display()))?;

    render(session.format, &report, format::report_text)
}
