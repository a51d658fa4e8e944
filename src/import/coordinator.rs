//! Import coordinator that drives one feed run end to end
//!
//! download → detect → extract → map → reconcile → report. Download and
//! parse failures end the run; per-record failures only bump counters.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::detect::{detect_format, extractor_for};
use super::mapper::{FieldMapper, SynonymTable};
use super::progress::{ProgressTracker, RecordOutcome, RunStatus};
use super::reconcile::{ReconcileOutcome, Reconciler};
use super::source::{FeedPreview, ImportError, PreviewRequest};
use crate::fetch::Downloader;
use crate::search::{sync_documents, SearchIndex};
use crate::store::Store;
use crate::types::{FeedDefinition, FeedId, DEFAULT_ITEM_ELEMENT};

/// Default number of records reconciled concurrently
pub const DEFAULT_WORKERS: usize = 4;

/// Default preview byte cap (5 MiB)
pub const DEFAULT_PREVIEW_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Per-record problems written to the run log before sampling kicks in
const RECORD_LOG_HEAD: u64 = 20;

/// After the head, one in this many problems is logged
const RECORD_LOG_EVERY: u64 = 100;

/// Final counters of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl RunSummary {
    fn add(&mut self, outcome: RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Error => self.errors += 1,
        }
    }

    /// Products written by the run
    pub fn persisted(&self) -> u64 {
        self.created + self.updated
    }
}

/// Import coordinator for feed runs
pub struct ImportCoordinator {
    store: Arc<dyn Store>,
    downloader: Arc<dyn Downloader>,
    preview_downloader: Arc<dyn Downloader>,
    progress: Arc<ProgressTracker>,
    search: Option<Arc<dyn SearchIndex>>,
    synonyms: SynonymTable,
    workers: usize,
    preview_max_bytes: u64,
}

impl ImportCoordinator {
    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Start and execute a run in the calling task
    pub async fn run(&self, feed: &FeedDefinition, run_id: Uuid, cancel: &AtomicBool) -> Result<RunSummary, ImportError> {
        self.begin(feed.id, run_id);
        self.execute(feed, run_id, cancel).await
    }

    /// Replace the feed's progress with a fresh `downloading` state
    pub fn begin(&self, feed_id: FeedId, run_id: Uuid) {
        self.progress.start(feed_id, run_id);
    }

    /// Execute a run whose progress was already started with [`begin`](Self::begin).
    ///
    /// Drives the run to a terminal state in both the tracker and the feed
    /// row, and returns the same outcome to the caller.
    pub async fn execute(&self, feed: &FeedDefinition, run_id: Uuid, cancel: &AtomicBool) -> Result<RunSummary, ImportError> {
        info!("Starting run {} for feed '{}' ({})", run_id, feed.name, feed.id);
        let started = Instant::now();

        let result = match self.store.mark_feed_started(feed.id).await {
            Ok(()) => self.pipeline(feed, run_id, cancel).await,
            Err(e) => Err(ImportError::Store(e)),
        };

        match &result {
            Ok(summary) => {
                let message = format!(
                    "completed: {} created, {} updated, {} skipped, {} errors",
                    summary.created, summary.updated, summary.skipped, summary.errors
                );
                self.progress.finish(feed.id, run_id, RunStatus::Completed, &message);
                self.persist_result(feed.id, RunStatus::Completed, Some(summary.persisted())).await;
                info!("Run {} {} in {:.1}s", run_id, message, started.elapsed().as_secs_f64());
                self.resync(feed.id).await;
            }
            Err(ImportError::Cancelled) => {
                let state = self.progress.snapshot(feed.id);
                let message = format!("cancelled after {} of {} records", state.processed, state.total);
                self.progress.finish(feed.id, run_id, RunStatus::Cancelled, &message);
                self.persist_result(feed.id, RunStatus::Cancelled, None).await;
                info!("Run {} {}", run_id, message);
            }
            Err(e) => self.fail(feed.id, run_id, &e.to_string()).await,
        }

        result
    }

    /// Mark a run failed in the tracker and the feed row
    pub async fn fail(&self, feed_id: FeedId, run_id: Uuid, message: &str) {
        warn!("Run {} for feed {} failed: {}", run_id, feed_id, message);
        self.progress.finish(feed_id, run_id, RunStatus::Failed, message);
        self.persist_result(feed_id, RunStatus::Failed, None).await;
    }

    async fn pipeline(&self, feed: &FeedDefinition, run_id: Uuid, cancel: &AtomicBool) -> Result<RunSummary, ImportError> {
        let bytes = self.downloader.fetch(&feed.url).await?;
        if cancel.load(Ordering::Relaxed) {
            return Err(ImportError::Cancelled);
        }
        self.progress.set_status(
            feed.id,
            run_id,
            RunStatus::Parsing,
            format!("downloaded {} bytes", bytes.len()),
        );

        let hint = feed.format;
        let item_element = feed.item_element.clone();
        let (format, records) = tokio::task::spawn_blocking(move || {
            let format = detect_format(&bytes, hint);
            (format, extractor_for(format, &item_element).extract(&bytes))
        })
        .await?;

        if records.is_empty() {
            return Err(ImportError::NoItems);
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(ImportError::Cancelled);
        }

        let total = records.len() as u64;
        self.progress.set_total(feed.id, run_id, total);
        self.progress.set_status(
            feed.id,
            run_id,
            RunStatus::Importing,
            format!("importing {} {} records", total, format),
        );
        info!("Feed {}: parsed {} {} records", feed.id, total, format);

        let mapper = FieldMapper::new(&feed.field_mapping, self.synonyms.clone());
        let reconciler = Reconciler::new(self.store.clone()).with_feed(feed.id);
        let problems = AtomicU64::new(0);

        let (mapper, reconciler, problems) = (&mapper, &reconciler, &problems);
        let summary = futures::stream::iter(records.into_iter().enumerate())
            .map(|(index, raw)| async move {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }

                let record = mapper.map(&raw);
                let outcome = match reconciler.reconcile(&record).await {
                    Ok(ReconcileOutcome::Created(_)) => RecordOutcome::Created,
                    Ok(ReconcileOutcome::Updated(_)) => RecordOutcome::Updated,
                    Ok(ReconcileOutcome::Skipped(reason)) => {
                        debug!("Record #{} skipped: {}", index + 1, reason);
                        if sampled(problems) {
                            self.progress
                                .log(feed.id, run_id, format!("record #{} skipped: {}", index + 1, reason));
                        }
                        RecordOutcome::Skipped
                    }
                    Err(e) => {
                        if sampled(problems) {
                            warn!("Record #{} of feed {} failed: {}", index + 1, feed.id, e);
                            self.progress
                                .log(feed.id, run_id, format!("record #{} failed: {}", index + 1, e));
                        }
                        RecordOutcome::Error
                    }
                };
                self.progress.record(feed.id, run_id, outcome);
                Some(outcome)
            })
            .buffer_unordered(self.workers)
            .fold(
                RunSummary {
                    total,
                    ..Default::default()
                },
                |mut summary, outcome| async move {
                    if let Some(outcome) = outcome {
                        summary.add(outcome);
                    }
                    summary
                },
            )
            .await;

        if summary.processed < total && cancel.load(Ordering::Relaxed) {
            return Err(ImportError::Cancelled);
        }
        Ok(summary)
    }

    async fn persist_result(&self, feed_id: FeedId, status: RunStatus, product_count: Option<u64>) {
        if let Err(e) = self
            .store
            .record_feed_run_result(feed_id, status.as_str(), product_count)
            .await
        {
            warn!("Failed to record run result for feed {}: {}", feed_id, e);
        }
    }

    /// Push the feed's products to the search index; failures only warn
    async fn resync(&self, feed_id: FeedId) {
        let Some(index) = &self.search else {
            return;
        };
        match self.store.products_for_feed(feed_id).await {
            Ok(documents) => {
                if sync_documents(index.as_ref(), &documents).await {
                    info!("Synced {} products of feed {} to search", documents.len(), feed_id);
                }
            }
            Err(e) => warn!("Could not load products of feed {} for search sync: {}", feed_id, e),
        }
    }

    /// Download a bounded prefix of a feed and describe it
    pub async fn preview(&self, request: &PreviewRequest) -> Result<FeedPreview, ImportError> {
        let payload = self
            .preview_downloader
            .fetch_limited(&request.url, self.preview_max_bytes)
            .await?;
        let truncated = payload.truncated;

        let hint = request.format;
        let item_element = request
            .item_element
            .clone()
            .unwrap_or_else(|| DEFAULT_ITEM_ELEMENT.to_string());
        let mut preview = tokio::task::spawn_blocking(move || {
            let format = detect_format(&payload.bytes, hint);
            extractor_for(format, &item_element).preview(&payload.bytes)
        })
        .await?;

        preview.truncated = truncated;
        debug!(
            "Preview of {}: {} {} items (truncated: {})",
            request.url, preview.total_items, preview.detected_type, truncated
        );
        Ok(preview)
    }
}

/// Count a per-record problem and decide whether to log it
fn sampled(counter: &AtomicU64) -> bool {
    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    n <= RECORD_LOG_HEAD || n % RECORD_LOG_EVERY == 0
}

/// Builder for ImportCoordinator with sensible defaults
pub struct ImportCoordinatorBuilder {
    store: Arc<dyn Store>,
    downloader: Arc<dyn Downloader>,
    preview_downloader: Option<Arc<dyn Downloader>>,
    progress: Option<Arc<ProgressTracker>>,
    search: Option<Arc<dyn SearchIndex>>,
    synonyms: SynonymTable,
    workers: usize,
    preview_max_bytes: u64,
}

impl ImportCoordinatorBuilder {
    pub fn new(store: Arc<dyn Store>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            store,
            downloader,
            preview_downloader: None,
            progress: None,
            search: None,
            synonyms: SynonymTable::default(),
            workers: DEFAULT_WORKERS,
            preview_max_bytes: DEFAULT_PREVIEW_MAX_BYTES,
        }
    }

    /// Separate downloader for previews (typically with a shorter timeout)
    pub fn with_preview_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.preview_downloader = Some(downloader);
        self
    }

    /// Share a progress tracker with the poll endpoint
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_search(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(index);
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    /// Records reconciled concurrently (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_preview_max_bytes(mut self, max_bytes: u64) -> Self {
        self.preview_max_bytes = max_bytes.max(1);
        self
    }

    pub fn build(self) -> ImportCoordinator {
        let preview_downloader = self
            .preview_downloader
            .unwrap_or_else(|| self.downloader.clone());
        ImportCoordinator {
            store: self.store,
            downloader: self.downloader,
            preview_downloader,
            progress: self.progress.unwrap_or_default(),
            search: self.search,
            synonyms: self.synonyms,
            workers: self.workers,
            preview_max_bytes: self.preview_max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, Payload};
    use crate::store::{CatalogStore, FeedStore, MemoryStore};
    use async_trait::async_trait;

    /// Serves a fixed payload for every URL
    struct StaticDownloader(Vec<u8>);

    #[async_trait]
    impl Downloader for StaticDownloader {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            Ok(self.0.clone())
        }

        async fn fetch_limited(&self, _url: &str, max_bytes: u64) -> Result<Payload, FetchError> {
            let max = max_bytes as usize;
            Ok(Payload {
                bytes: self.0[..self.0.len().min(max)].to_vec(),
                truncated: self.0.len() > max,
            })
        }
    }

    struct FailingDownloader;

    #[async_trait]
    impl Downloader for FailingDownloader {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::InvalidUrl(url.to_string()))
        }

        async fn fetch_limited(&self, url: &str, _max_bytes: u64) -> Result<Payload, FetchError> {
            Err(FetchError::InvalidUrl(url.to_string()))
        }
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SHOP>
  <SHOPITEM><PRODUCTNAME>Phone</PRODUCTNAME><EAN>100</EAN><PRICE_VAT>199.90</PRICE_VAT>
    <CATEGORYTEXT>Electronics | Phones</CATEGORYTEXT></SHOPITEM>
  <SHOPITEM><PRODUCTNAME>Case</PRODUCTNAME><EAN>200</EAN><PRICE_VAT>9,90</PRICE_VAT>
    <CATEGORYTEXT>Electronics | Phones | Accessories</CATEGORYTEXT></SHOPITEM>
  <SHOPITEM><PRODUCTNAME>Freebie</PRODUCTNAME><EAN>300</EAN><PRICE_VAT>0</PRICE_VAT></SHOPITEM>
</SHOP>"#;

    async fn setup(payload: &str) -> (Arc<MemoryStore>, ImportCoordinator, FeedDefinition) {
        let store = Arc::new(MemoryStore::new());
        let feed = FeedDefinition::new("shop", "https://shop.example.com/feed.xml");
        store.create_feed(&feed).await.unwrap();
        let coordinator = ImportCoordinatorBuilder::new(
            store.clone(),
            Arc::new(StaticDownloader(payload.as_bytes().to_vec())),
        )
        .with_workers(2)
        .build();
        (store, coordinator, feed)
    }

    #[tokio::test]
    async fn test_run_completes_and_counts() {
        let (store, coordinator, feed) = setup(FEED).await;
        let summary = coordinator
            .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.count_categories().await.unwrap(), 3);

        let state = coordinator.progress().snapshot(feed.id);
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.processed, state.total);
        assert_eq!(state.percent, 100.0);

        let stored = store.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.last_status.as_deref(), Some("completed"));
        assert_eq!(stored.product_count, 2);
    }

    #[tokio::test]
    async fn test_empty_feed_fails() {
        let (store, coordinator, feed) = setup("<SHOP></SHOP>").await;
        let err = coordinator
            .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::NoItems));

        let state = coordinator.progress().snapshot(feed.id);
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.message, "feed contains no items");
        let stored = store.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.last_status.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn test_download_failure_fails_run() {
        let store = Arc::new(MemoryStore::new());
        let feed = FeedDefinition::new("shop", "nowhere");
        store.create_feed(&feed).await.unwrap();
        let coordinator = ImportCoordinatorBuilder::new(store.clone(), Arc::new(FailingDownloader)).build();

        let err = coordinator
            .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Fetch(_)));
        assert_eq!(coordinator.progress().snapshot(feed.id).status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_before_import() {
        let (store, coordinator, feed) = setup(FEED).await;
        let err = coordinator
            .run(&feed, Uuid::new_v4(), &AtomicBool::new(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Cancelled));
        assert_eq!(coordinator.progress().snapshot(feed.id).status, RunStatus::Cancelled);
        assert_eq!(store.count_products().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_mapping_applied() {
        let csv = "NAZOV;CENA;KOD\nStolicka;49,90;K-1\n";
        let (store, coordinator, _) = setup(csv).await;
        let feed = FeedDefinition::new("sk", "/tmp/sk.csv").with_mapping("KOD", "sku");
        store.create_feed(&feed).await.unwrap();

        let summary = coordinator
            .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
            .await
            .unwrap();
        assert_eq!(summary.created, 1);
        let product = &store.products()[0];
        assert_eq!(product.fields.title, "Stolicka");
        assert_eq!(product.fields.sku, "K-1");
        assert_eq!(product.fields.price, 49.90);
    }

    #[tokio::test]
    async fn test_preview_is_capped() {
        let (_, coordinator, _) = setup(FEED).await;
        let preview = coordinator
            .preview(&PreviewRequest {
                url: "https://shop.example.com/feed.xml".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(preview.total_items, 3);
        assert!(!preview.truncated);
        assert!(preview.fields.contains(&"PRODUCTNAME".to_string()));

        let store = Arc::new(MemoryStore::new());
        let small = ImportCoordinatorBuilder::new(store, Arc::new(StaticDownloader(FEED.as_bytes().to_vec())))
            .with_preview_max_bytes(200)
            .build();
        let preview = small
            .preview(&PreviewRequest {
                url: "https://shop.example.com/feed.xml".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(preview.truncated);
        assert!(preview.total_items < 3);
    }

    #[test]
    fn test_sampling() {
        let counter = AtomicU64::new(0);
        let logged = (0..1000).filter(|_| sampled(&counter)).count();
        // 20 head entries plus 100, 200, ..., 1000
        assert_eq!(logged, 20 + 10);
    }
}
