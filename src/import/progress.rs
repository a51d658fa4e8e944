//! Progress tracking for feed import runs
//!
//! One [`ProgressState`] per feed, replaced wholesale when a new run for
//! that feed starts and kept after the run ends until the next one.
//! Every read and write goes through a single lock; counters are bumped
//! per record but the percentage is only recomputed every
//! `percent_interval` records and at the end of the run.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use uuid::Uuid;

use crate::types::FeedId;

/// Default maximum number of retained log lines per run
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Default number of records between percentage recomputations
pub const DEFAULT_PERCENT_INTERVAL: u64 = 50;

/// Lifecycle of a single import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Downloading,
    Parsing,
    Importing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Downloading => "downloading",
            RunStatus::Parsing => "parsing",
            RunStatus::Importing => "importing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
    Skipped,
    Error,
}

/// Snapshot of one feed's latest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub feed_id: FeedId,
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub message: String,
    pub total: u64,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub percent: f64,
    pub logs: VecDeque<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    /// State reported for a feed that has never run
    pub fn idle(feed_id: FeedId) -> Self {
        Self {
            feed_id,
            run_id: None,
            status: RunStatus::Idle,
            message: String::new(),
            total: 0,
            processed: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            percent: 0.0,
            logs: VecDeque::new(),
            started_at: None,
            finished_at: None,
        }
    }

    fn recompute_percent(&mut self) {
        self.percent = if self.total == 0 {
            0.0
        } else {
            let raw = self.processed as f64 * 100.0 / self.total as f64;
            (raw.min(100.0) * 10.0).round() / 10.0
        };
    }
}

/// Process-wide registry of run progress, keyed by feed
pub struct ProgressTracker {
    runs: Mutex<HashMap<FeedId, ProgressState>>,
    log_capacity: usize,
    percent_interval: u64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY, DEFAULT_PERCENT_INTERVAL)
    }
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(log_capacity: usize, percent_interval: u64) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            log_capacity: log_capacity.max(1),
            percent_interval: percent_interval.max(1),
        }
    }

    /// Begin a new run, discarding whatever the previous run left behind
    pub fn start(&self, feed_id: FeedId, run_id: Uuid) {
        let mut state = ProgressState::idle(feed_id);
        state.run_id = Some(run_id);
        state.status = RunStatus::Downloading;
        state.message = "downloading feed".to_string();
        state.started_at = Some(Utc::now());
        push_log(&mut state.logs, self.log_capacity, "run started");

        self.runs.lock().insert(feed_id, state);
    }

    /// Move a run to a non-terminal stage
    pub fn set_status(&self, feed_id: FeedId, run_id: Uuid, status: RunStatus, message: impl Into<String>) {
        let message = message.into();
        self.with_run(feed_id, run_id, |state, cap, _| {
            state.status = status;
            push_log(&mut state.logs, cap, &message);
            state.message = message;
        });
    }

    /// Set the number of records the run will attempt
    pub fn set_total(&self, feed_id: FeedId, run_id: Uuid, total: u64) {
        self.with_run(feed_id, run_id, |state, _, _| {
            state.total = total;
            state.recompute_percent();
        });
    }

    /// Count one attempted record
    pub fn record(&self, feed_id: FeedId, run_id: Uuid, outcome: RecordOutcome) {
        self.with_run(feed_id, run_id, |state, _, interval| {
            state.processed += 1;
            match outcome {
                RecordOutcome::Created => state.created += 1,
                RecordOutcome::Updated => state.updated += 1,
                RecordOutcome::Skipped => state.skipped += 1,
                RecordOutcome::Error => state.errors += 1,
            }
            if state.processed % interval == 0 || state.processed == state.total {
                state.recompute_percent();
            }
        });
    }

    /// Append a line to the run's rolling log
    pub fn log(&self, feed_id: FeedId, run_id: Uuid, line: impl AsRef<str>) {
        self.with_run(feed_id, run_id, |state, cap, _| {
            push_log(&mut state.logs, cap, line.as_ref());
        });
    }

    /// Freeze the run in a terminal state
    pub fn finish(&self, feed_id: FeedId, run_id: Uuid, status: RunStatus, message: impl Into<String>) {
        let message = message.into();
        self.with_run(feed_id, run_id, |state, cap, _| {
            state.status = status;
            state.recompute_percent();
            state.finished_at = Some(Utc::now());
            push_log(&mut state.logs, cap, &message);
            state.message = message;
        });
    }

    /// Current state of a feed's latest run, `idle` if it never ran
    pub fn snapshot(&self, feed_id: FeedId) -> ProgressState {
        self.get(feed_id).unwrap_or_else(|| ProgressState::idle(feed_id))
    }

    pub fn get(&self, feed_id: FeedId) -> Option<ProgressState> {
        self.runs.lock().get(&feed_id).cloned()
    }

    /// Apply `f` to the state of `run_id`; writes from a superseded run are dropped
    fn with_run<F>(&self, feed_id: FeedId, run_id: Uuid, f: F)
    where
        F: FnOnce(&mut ProgressState, usize, u64),
    {
        let mut runs = self.runs.lock();
        if let Some(state) = runs.get_mut(&feed_id) {
            if state.run_id == Some(run_id) {
                f(state, self.log_capacity, self.percent_interval);
            }
        }
    }
}

fn push_log(logs: &mut VecDeque<String>, capacity: usize, line: &str) {
    while logs.len() >= capacity {
        logs.pop_front();
    }
    logs.push_back(format!("[{}] {}", Utc::now().format("%H:%M:%S"), line));
}
