//! Configuration management for ledgerctl
//!
//! Settings come from a TOML file, `--config <path>` or
//! `~/.ledgerdex/config.toml`. Every section is optional:
//!
//! ```toml
//! output_format = "json"
//!
//! [ingest]
//! chunk_size = 1000
//! wave_size = 30
//! wave_delay_ms = 30000
//!
//! [ledger]
//! max_writes_per_block = 500
//!
//! [query]
//! strategy = "bloom_accelerated"
//! ```

use anyhow::{Context, Result};
use ledgerdex_client::IngestConfig;
use ledgerdex_storage::{LedgerConfig, QueryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default output format
    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Text,
}

impl Config {
    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Default config file path (~/.ledgerdex/config.toml)
    pub fn config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".ledgerdex").join("config.toml")
    }
}
