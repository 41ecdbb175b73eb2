//! Event catalog loader
//! Loads a versioned YAML event catalog to replace the built-in one

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::audit::catalog::{CatalogEntry, EventCatalog};
use crate::error::{LedgerError, Result};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    version: String,
    events: BTreeMap<String, CatalogEntry>,
}

/// Load and validate a catalog file.
pub fn load_catalog(path: &Path) -> Result<EventCatalog> {
    info!("Loading event catalog from: {:?}", path);

    if !path.exists() {
        return Err(LedgerError::Config(format!(
            "Event catalog not found: {:?}",
            path
        )));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| LedgerError::Config(format!("Failed to read {:?}: {}", path, e)))?;

    let catalog = parse_catalog(&contents)
        .map_err(|e| LedgerError::Config(format!("Invalid catalog {:?}: {}", path, e)))?;

    info!(
        "Loaded event catalog {} with {} event types",
        catalog.version,
        catalog.len()
    );
    Ok(catalog)
}

pub fn parse_catalog(contents: &str) -> Result<EventCatalog> {
    let file: CatalogFile = serde_yaml::from_str(contents)
        .map_err(|e| LedgerError::Config(format!("YAML parse error: {}", e)))?;
    EventCatalog::new(file.version, file.events)
}
