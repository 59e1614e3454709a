//! Subcommands and the state they share.

pub mod config;
pub mod extract;
pub mod ingest;
pub mod output;
pub mod receipt;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use kabala_core::{KabalaConfig, ReceiptService, SqliteStore, TextDumpOcr};

/// Output format shared by commands that print receipts.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

/// An opened archive and the acting user.
pub struct Context {
    pub service: ReceiptService,
    pub user: String,
}

impl Context {
    pub fn open(config_path: Option<&str>, db: Option<&Path>, user: &str) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;

        let db_path = db.map(Path::to_path_buf).unwrap_or_else(default_db_path);
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let store = SqliteStore::open(&db_path)?;
        debug!("Using database {}", db_path.display());

        Ok(Self {
            service: ReceiptService::new(Arc::new(store), Arc::new(TextDumpOcr::new()), config),
            user: user.to_string(),
        })
    }
}

/// Explicit config file, else the default file when present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<KabalaConfig> {
    match config_path {
        Some(path) => Ok(KabalaConfig::from_file(Path::new(path))?),
        None => {
            let path = config::default_config_path();
            if path.exists() {
                Ok(KabalaConfig::from_file(&path)?)
            } else {
                Ok(KabalaConfig::default())
            }
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kabala")
        .join("kabala.db")
}
