//! Background run management
//!
//! Every import run executes on its own tokio task, detached from the
//! request that triggered it. At most one run per feed is in flight; the
//! entry for a feed is dropped when its run reaches a terminal state.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::import::{ImportCoordinator, ImportError};
use crate::types::{FeedDefinition, FeedId};

use super::metrics::{ServiceMetrics, Timer};

/// Errors from run control
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("feed {0} already has a run in progress")]
    AlreadyRunning(FeedId),

    #[error("feed {0} has no run in progress")]
    NotRunning(FeedId),
}

/// A run that has not reached a terminal state yet
struct ActiveRun {
    run_id: Uuid,
    cancel: Arc<AtomicBool>,
}

/// Tracks and controls in-flight runs
pub struct RunManager {
    runs: Arc<DashMap<FeedId, ActiveRun>>,
    coordinator: Arc<ImportCoordinator>,
    metrics: Arc<ServiceMetrics>,
}

impl RunManager {
    pub fn new(coordinator: Arc<ImportCoordinator>, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            coordinator,
            metrics,
        }
    }

    pub fn coordinator(&self) -> &Arc<ImportCoordinator> {
        &self.coordinator
    }

    /// Start a run for `feed` in the background and return its run id.
    ///
    /// Progress is switched to `downloading` before this returns, so a
    /// poll issued right after sees the new run.
    pub fn start(&self, feed: FeedDefinition) -> Result<Uuid, RunError> {
        let feed_id = feed.id;
        let run_id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));

        match self.runs.entry(feed_id) {
            Entry::Occupied(_) => return Err(RunError::AlreadyRunning(feed_id)),
            Entry::Vacant(slot) => {
                slot.insert(ActiveRun {
                    run_id,
                    cancel: cancel.clone(),
                });
            }
        }

        self.coordinator.begin(feed_id, run_id);
        self.metrics.imports_started.inc();
        self.metrics.imports_active.inc();
        info!("Queued run {} for feed {}", run_id, feed_id);

        let coordinator = self.coordinator.clone();
        let run = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.execute(&feed, run_id, &cancel).await }
        });

        // Supervisor: a panic inside the run task surfaces here as a JoinError
        let runs = Arc::clone(&self.runs);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let timer = Timer::start();
            match run.await {
                Ok(Ok(summary)) => {
                    metrics.imports_completed.inc();
                    metrics.record_summary(&summary);
                }
                Ok(Err(ImportError::Cancelled)) => metrics.imports_cancelled.inc(),
                Ok(Err(_)) => metrics.imports_failed.inc(),
                Err(e) => {
                    let detail = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        "run task aborted".to_string()
                    };
                    error!("Run {} for feed {} crashed: {}", run_id, feed_id, detail);
                    coordinator
                        .fail(feed_id, run_id, &format!("internal error: {}", detail))
                        .await;
                    metrics.imports_failed.inc();
                }
            }
            timer.record(&metrics.import_duration);
            metrics.imports_active.dec();
            runs.remove_if(&feed_id, |_, active| active.run_id == run_id);
        });

        Ok(run_id)
    }

    /// Ask the feed's in-flight run to stop at the next record boundary
    pub fn cancel(&self, feed_id: FeedId) -> Result<Uuid, RunError> {
        let active = self.runs.get(&feed_id).ok_or(RunError::NotRunning(feed_id))?;
        active.cancel.store(true, Ordering::Relaxed);
        info!("Cancellation requested for run {} of feed {}", active.run_id, feed_id);
        Ok(active.run_id)
    }

    /// Request cancellation of every in-flight run
    pub fn cancel_all(&self) {
        for active in self.runs.iter() {
            active.cancel.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_running(&self, feed_id: FeedId) -> bool {
        self.runs.contains_key(&feed_id)
    }

    /// Run id of the feed's in-flight run
    pub fn active_run(&self, feed_id: FeedId) -> Option<Uuid> {
        self.runs.get(&feed_id).map(|active| active.run_id)
    }

    pub fn active_count(&self) -> usize {
        self.runs.len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
