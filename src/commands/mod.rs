//! CLI subcommand implementations

pub mod feeds;
pub mod import;
pub mod init;
pub mod preview;
pub mod serve;

use anyhow::{Context, Result};
use feedsync::config::Config;
use feedsync::store::SqliteStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Open the configured catalog database
pub async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    Ok(Arc::new(store))
}

/// Parse repeated `RAW=canonical` arguments
pub fn parse_mapping(entries: &[String]) -> Result<HashMap<String, String>> {
    entries
        .iter()
        .map(|entry| {
            let (raw, canonical) = entry
                .split_once('=')
                .with_context(|| format!("Invalid mapping '{}', expected RAW=canonical", entry))?;
            Ok((raw.trim().to_string(), canonical.trim().to_string()))
        })
        .collect()
}

/// Turn a relative local path into an absolute one; URLs pass through
pub fn resolve_source(source: &str) -> Result<String> {
    if source.contains("://") || source.starts_with('/') {
        return Ok(source.to_string());
    }
    let path = std::path::Path::new(source)
        .canonicalize()
        .with_context(|| format!("Feed file not found: {}", source))?;
    Ok(path.to_string_lossy().to_string())
}
