use anyhow::{Context, Result};
use feedsync::config::Config;
use std::path::PathBuf;

pub async fn init_config(path: PathBuf, force: bool) -> Result<()> {
    let config = Config::default();
    let config_path = path.join("feedsync.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it",
            config_path.display()
        );
    }

    let toml_content = format!(
        r#"# feedsync configuration

[http]
listen_addr = "{}"
# Bearer keys required on every route except /health; empty disables auth
api_keys = []
cors_enabled = {}

[import]
# Records reconciled concurrently per run
workers = {}
# Records between progress percentage updates
progress_interval = {}
progress_log_capacity = {}
# Bytes read when previewing a feed
preview_max_bytes = {}
sync_search = {}

[fetch]
user_agent = "{}"
timeout_secs = {}
connect_timeout_secs = {}
preview_timeout_secs = {}
# Accept absolute paths and file:// URLs as feed locations in the service
allow_local_files = {}

[database]
url = "{}"
max_connections = {}

[search]
enabled = {}
url = "{}"
index = "{}"

[mapping.synonyms]
# Replace the built-in raw names tried for a canonical field, e.g.
# title = ["NAZOV", "PRODUCTNAME"]

[logging]
format = "text"
level = "info"
"#,
        config.http.listen_addr,
        config.http.cors_enabled,
        config.import.workers,
        config.import.progress_interval,
        config.import.progress_log_capacity,
        config.import.preview_max_bytes,
        config.import.sync_search,
        config.fetch.user_agent,
        config.fetch.timeout_secs,
        config.fetch.connect_timeout_secs,
        config.fetch.preview_timeout_secs,
        config.fetch.allow_local_files,
        config.database.url,
        config.database.max_connections,
        config.search.enabled,
        config.search.url,
        config.search.index,
    );

    std::fs::create_dir_all(&path)?;
    std::fs::write(&config_path, toml_content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created configuration file: {}", config_path.display());

    Ok(())
}
