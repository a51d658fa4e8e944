//! Database and search index configuration

use serde::{Deserialize, Serialize};

/// Catalog database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://feedsync.db".to_string(),
            max_connections: 8,
        }
    }
}

/// Elasticsearch-compatible search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    pub url: String,
    pub index: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:9200".to_string(),
            index: "products".to_string(),
            timeout_secs: 60,
        }
    }
}
