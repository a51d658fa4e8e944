//! HTTP API configuration

use serde::{Deserialize, Serialize};

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address (e.g. "0.0.0.0:8080")
    pub listen_addr: String,
    /// API keys for bearer authentication (empty = no auth required)
    pub api_keys: Vec<String>,
    /// Enable permissive CORS for browser-based admin UIs
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            api_keys: Vec::new(),
            cors_enabled: false,
        }
    }
}
