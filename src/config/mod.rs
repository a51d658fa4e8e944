//! Configuration for feedsync

mod daemon;
mod import;
mod logging;
mod storage;

pub use daemon::HttpConfig;
pub use import::{FetchConfig, ImportSettings, MappingConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use storage::{DatabaseConfig, SearchConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::import::mapper::SynonymTable;

/// Default user agent for feed downloads
pub const DEFAULT_USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; feedsync/", env!("CARGO_PKG_VERSION"), ")");

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub import: ImportSettings,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Synonym table with the configured overrides applied
    pub fn synonyms(&self) -> Result<SynonymTable> {
        SynonymTable::with_overrides(&self.mapping.synonyms).map_err(|e| anyhow::anyhow!(e))
    }

    /// Validate all fields, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.import.workers == 0 {
            errors.push("import.workers must be positive".to_string());
        }
        if self.import.workers > 256 {
            errors.push("import.workers must be <= 256".to_string());
        }
        if self.import.progress_interval == 0 {
            errors.push("import.progress_interval must be positive".to_string());
        }
        if self.import.progress_log_capacity == 0 {
            errors.push("import.progress_log_capacity must be positive".to_string());
        }
        if self.import.preview_max_bytes == 0 {
            errors.push("import.preview_max_bytes must be positive".to_string());
        }

        if self.fetch.timeout_secs == 0 {
            errors.push("fetch.timeout_secs must be positive".to_string());
        }
        if self.fetch.connect_timeout_secs == 0 {
            errors.push("fetch.connect_timeout_secs must be positive".to_string());
        }
        if self.fetch.user_agent.trim().is_empty() {
            errors.push("fetch.user_agent must not be empty".to_string());
        }

        if self.database.url.trim().is_empty() {
            errors.push("database.url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        if self.search.enabled {
            if url::Url::parse(&self.search.url).is_err() {
                errors.push(format!("search.url is not a valid URL: {}", self.search.url));
            }
            if self.search.index.trim().is_empty() {
                errors.push("search.index must not be empty".to_string());
            }
        }

        if let Err(e) = SynonymTable::with_overrides(&self.mapping.synonyms) {
            errors.push(format!("mapping.synonyms: {}", e));
        }

        if self.http.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("http.listen_addr is not a socket address: {}", self.http.listen_addr));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_every_error() {
        let mut cfg = Config::default();
        cfg.import.workers = 0;
        cfg.database.url = String::new();
        cfg.http.listen_addr = "nowhere".to_string();

        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("import.workers must be positive"), "{}", msg);
        assert!(msg.contains("database.url must not be empty"), "{}", msg);
        assert!(msg.contains("http.listen_addr"), "{}", msg);
    }

    #[test]
    fn validate_rejects_unknown_synonym_field() {
        let mut cfg = Config::default();
        cfg.mapping.synonyms.insert("colour".to_string(), vec!["FARBA".to_string()]);
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("unknown canonical field"), "{}", msg);
    }

    #[test]
    fn search_url_only_checked_when_enabled() {
        let mut cfg = Config::default();
        cfg.search.url = "not a url".to_string();
        assert!(cfg.validate().is_ok());
        cfg.search.enabled = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [import]
            workers = 8

            [mapping.synonyms]
            title = ["ARTIKEL", "NAME"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.import.workers, 8);
        assert_eq!(cfg.import.progress_interval, 50);
        assert_eq!(cfg.fetch.timeout_secs, 900);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.synonyms().unwrap().candidates(crate::import::mapper::CanonicalField::Title).len(), 2);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedsync.toml");
        std::fs::write(&path, "[http]\nlisten_addr = \"0.0.0.0:9000\"\n").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.http.listen_addr, "0.0.0.0:9000");
        assert!(Config::load_or_default(&dir.path().join("missing.toml")).is_ok());
    }
}
