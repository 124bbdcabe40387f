//! LedgerDex CLI (ledgerctl)
//!
//! Command-line tool for bulk-loading records into a ledger snapshot and
//! reconstructing key histories from it.
//!
//! ## Quick Start
//!
//! ```bash
//! # Load a TPC-H lineitem export, 1000 records per chunk, 30 chunks per wave
//! ledgerctl --ledger orders.json ingest lineitem.json --wave-delay-ms 0
//!
//! # Every version of order 91041, accelerated by per-block bloom filters
//! ledgerctl --ledger orders.json history 91041
//!
//! # Third version only, as JSON
//! ledgerctl --ledger orders.json --format json point 91041 2
//!
//! # Keys updated at least twice in blocks 3..=7
//! ledgerctl --ledger orders.json block-range 3 7 --min-updates 2
//! ```
//!
//! ## Configuration
//!
//! - `LEDGERDEX_LEDGER`: ledger snapshot path (default: ledger.json)
//! - `LEDGERDEX_CONFIG`: TOML config (default: ~/.ledgerdex/config.toml)
//! - `LEDGERDEX_STRATEGY`: `baseline` or `bloom`
//! - `RUST_LOG`: log filter (default: info, written to stderr)

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledgerdex_storage::ReconstructionStrategy;
use std::path::PathBuf;

mod commands;
mod config;
mod format;

use commands::{IngestArgs, QueryCommand, Session};
use config::{Config, OutputFormat};

#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "LedgerDex history queries and bulk ingestion", long_about = None)]
struct Cli {
    /// Ledger snapshot file
    #[arg(
        long,
        global = true,
        env = "LEDGERDEX_LEDGER",
        default_value = "ledger.json"
    )]
    ledger: PathBuf,

    /// Config file (TOML)
    #[arg(long, global = true, env = "LEDGERDEX_CONFIG")]
    config: Option<PathBuf>,

    /// History reconstruction strategy: baseline or bloom
    #[arg(long, global = true, env = "LEDGERDEX_STRATEGY")]
    strategy: Option<ReconstructionStrategy>,

    /// Output format
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk-load a JSON record file in throttled waves
    Ingest(IngestArgs),

    #[command(flatten)]
    Query(QueryCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    ledgerdex_observability::init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(strategy) = cli.strategy {
        config.query.strategy = strategy;
    }
    let format = cli.format.unwrap_or(config.output_format);

    let session = Session::open(&cli.ledger, config, format).await?;

    let output = match cli.command {
        Commands::Ingest(args) => commands::handle_ingest(args, &session).await?,
        Commands::Query(command) => commands::handle_query_command(command, &session).await?,
    };
    println!("{}", output);

    if cli.print_metrics {
        print!("{}", ledgerdex_observability::gather_text());
    }

    Ok(())
}
