pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::merkle::DEFAULT_WINDOW;
use crate::error::{LedgerError, Result};

/// Where entries are made durable before they become visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JournalConfig {
    #[default]
    Memory,
    File { path: PathBuf },
    Sqlite { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub ledger_name: String,
    pub journal: JournalConfig,
    pub signing_key_path: Option<PathBuf>,
    /// Hex file holding the AES-256 key used to seal subject identifiers.
    pub sealing_key_path: Option<PathBuf>,
    pub merkle_window: usize,
    pub seal_timeout_ms: u64,
    pub verify_timeout_secs: u64,
    /// Bound on a search, including the wait for a store snapshot.
    pub search_timeout_ms: u64,
    pub catalog_path: Option<PathBuf>,
    pub include_genesis_in_search: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_name: "primary".to_string(),
            journal: JournalConfig::Memory,
            signing_key_path: None,
            sealing_key_path: None,
            merkle_window: DEFAULT_WINDOW,
            seal_timeout_ms: 2000,
            verify_timeout_secs: 30,
            search_timeout_ms: 10_000,
            catalog_path: None,
            include_genesis_in_search: false,
        }
    }
}

impl LedgerConfig {
    /// Load from an optional TOML file, then `AUDIT_LEDGER_*` environment
    /// variables (nested keys use `__`, e.g. `AUDIT_LEDGER_JOURNAL__KIND`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("AUDIT_LEDGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: LedgerConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LedgerError::Config(format!("Failed to load configuration: {}", e)))?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger_name.trim().is_empty() {
            return Err(LedgerError::Config("ledger_name must not be empty".to_string()));
        }
        if self.merkle_window == 0 {
            return Err(LedgerError::Config("merkle_window must be at least 1".to_string()));
        }
        if self.seal_timeout_ms == 0 {
            return Err(LedgerError::Config("seal_timeout_ms must be positive".to_string()));
        }
        if self.verify_timeout_secs == 0 {
            return Err(LedgerError::Config("verify_timeout_secs must be positive".to_string()));
        }
        if self.search_timeout_ms == 0 {
            return Err(LedgerError::Config("search_timeout_ms must be positive".to_string()));
        }
        if let JournalConfig::Sqlite { url } = &self.journal {
            if url.trim().is_empty() {
                return Err(LedgerError::Config("sqlite journal requires a url".to_string()));
            }
        }
        Ok(())
    }

    pub fn seal_timeout(&self) -> Duration {
        Duration::from_millis(self.seal_timeout_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}
