//! Import pipeline, downloader and mapping configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::import::progress::{DEFAULT_LOG_CAPACITY, DEFAULT_PERCENT_INTERVAL};

/// Import pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Records reconciled concurrently within one run
    pub workers: usize,
    /// Records between progress percentage updates
    pub progress_interval: u64,
    /// Rolling log lines kept per run
    pub progress_log_capacity: usize,
    /// Byte cap for feed previews
    pub preview_max_bytes: u64,
    /// Push imported products to the search index after a run
    pub sync_search: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            progress_interval: DEFAULT_PERCENT_INTERVAL,
            progress_log_capacity: DEFAULT_LOG_CAPACITY,
            preview_max_bytes: 5 * 1024 * 1024,
            sync_search: true,
        }
    }
}

/// Feed downloader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Overall timeout for one download
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Timeout used by previews
    pub preview_timeout_secs: u64,
    /// Accept absolute paths and `file://` URLs as feed locations
    pub allow_local_files: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: super::DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 15 * 60,
            connect_timeout_secs: 30,
            preview_timeout_secs: 60,
            allow_local_files: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn preview_timeout(&self) -> Duration {
        Duration::from_secs(self.preview_timeout_secs)
    }
}

/// Synonym table overrides, keyed by canonical field name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub synonyms: HashMap<String, Vec<String>>,
}
