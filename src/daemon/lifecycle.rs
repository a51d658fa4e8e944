//! Service lifecycle
//!
//! Wires the store, downloaders, search index and run manager together,
//! serves HTTP, and shuts everything down on Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fetch::HttpDownloader;
use crate::import::{ImportCoordinator, ImportCoordinatorBuilder, ProgressTracker};
use crate::search::ElasticsearchIndex;
use crate::store::{SqliteStore, Store};

use super::http::{AppState, HttpServer};
use super::jobs::RunManager;
use super::metrics::ServiceMetrics;

/// Time in-flight runs get to observe cancellation during shutdown
const RUN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Build an import coordinator from configuration
pub fn build_coordinator(config: &Config, store: Arc<dyn Store>) -> Result<ImportCoordinator> {
    let downloader = HttpDownloader::new(&config.fetch, config.fetch.timeout()).context("Failed to build HTTP client")?;
    let preview_downloader =
        HttpDownloader::new(&config.fetch, config.fetch.preview_timeout()).context("Failed to build HTTP client")?;

    let progress = Arc::new(ProgressTracker::new(
        config.import.progress_log_capacity,
        config.import.progress_interval,
    ));

    let mut builder = ImportCoordinatorBuilder::new(store, Arc::new(downloader))
        .with_preview_downloader(Arc::new(preview_downloader))
        .with_progress(progress)
        .with_synonyms(config.synonyms()?)
        .with_workers(config.import.workers)
        .with_preview_max_bytes(config.import.preview_max_bytes);

    if config.search.enabled && config.import.sync_search {
        let index = ElasticsearchIndex::new(&config.search).context("Failed to build search client")?;
        info!("Search sync enabled: {} index '{}'", config.search.url, config.search.index);
        builder = builder.with_search(Arc::new(index));
    }

    Ok(builder.build())
}

/// Running service instance
pub struct Service {
    config: Config,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
}

impl Service {
    /// Open the configured database and assemble the service
    pub async fn start(config: Config) -> Result<Self> {
        let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.url))?;
        Self::with_store(config, Arc::new(store))
    }

    /// Assemble the service over an existing store
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let coordinator = Arc::new(build_coordinator(&config, store)?);
        let metrics = ServiceMetrics::shared();
        let runs = Arc::new(RunManager::new(coordinator, metrics.clone()));
        let (shutdown_tx, _) = broadcast::channel(16);

        let state = AppState::new(runs, metrics).with_local_files(config.fetch.allow_local_files);

        Ok(Self {
            config,
            state,
            shutdown_tx,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Sender that stops [`run`](Self::run) when fired
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serve until a signal or the shutdown handle fires
    pub async fn run(&self) -> Result<()> {
        let shutdown_rx = self.shutdown_tx.subscribe();

        let http_server = HttpServer::new(self.config.http.clone(), self.state.clone());
        let shutdown_rx_http = self.shutdown_tx.subscribe();
        let http_handle = tokio::spawn(async move {
            match http_server.run(shutdown_rx_http).await {
                Ok(()) => info!("HTTP server shut down cleanly"),
                Err(e) => error!("HTTP server failed: {}", e),
            }
        });

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = Self::wait_for_sigterm() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = Self::wait_for_shutdown(shutdown_rx) => {
                info!("Shutdown requested");
            }
        }

        let _ = self.shutdown_tx.send(());
        self.drain_runs().await;

        let http_abort = http_handle.abort_handle();
        if tokio::time::timeout(Duration::from_secs(5), http_handle).await.is_err() {
            warn!("HTTP server did not shut down within 5s, aborting");
            http_abort.abort();
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Cancel in-flight runs and give them a moment to record it
    async fn drain_runs(&self) {
        let runs = &self.state.runs;
        if runs.active_count() == 0 {
            return;
        }

        info!("Cancelling {} in-flight run(s)", runs.active_count());
        runs.cancel_all();

        let deadline = tokio::time::Instant::now() + RUN_DRAIN_TIMEOUT;
        while runs.active_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if runs.active_count() > 0 {
            warn!("{} run(s) still active at shutdown", runs.active_count());
        }
    }

    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        std::future::pending::<()>().await
    }

    async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
        let _ = rx.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_service_stops_on_shutdown_handle() {
        let mut config = Config::default();
        config.http.listen_addr = "127.0.0.1:0".to_string();

        let service = Arc::new(Service::with_store(config, Arc::new(MemoryStore::new())).unwrap());
        let shutdown = service.shutdown_handle();

        let task = tokio::spawn({
            let service = service.clone();
            async move { service.run().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), task).await;
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[test]
    fn test_build_coordinator_rejects_bad_synonyms() {
        let mut config = Config::default();
        config.mapping.synonyms.insert("colour".to_string(), vec!["FARBA".to_string()]);
        assert!(build_coordinator(&config, Arc::new(MemoryStore::new())).is_err());
    }
}
