//! Service metrics
//!
//! Process-wide counters for import runs, records and HTTP traffic.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::import::RunSummary;

/// Atomic counter for thread-safe incrementing
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Atomic gauge for thread-safe value tracking
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement, saturating at zero
    pub fn dec(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram of durations
#[derive(Debug)]
pub struct Histogram {
    /// Bucket upper bounds in microseconds
    buckets: Vec<u64>,
    /// Count per bucket
    counts: Vec<AtomicU64>,
    /// Values above the last bound
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Request latency buckets: 1ms up to 5s
    pub fn new_latency() -> Self {
        Self::with_buckets(vec![1000, 5000, 10000, 25000, 50000, 100000, 250000, 500000, 1000000, 5000000])
    }

    /// Import run buckets: 1s up to 30min
    pub fn new_run_duration() -> Self {
        Self::with_buckets(
            [1u64, 5, 15, 30, 60, 120, 300, 600, 1800]
                .iter()
                .map(|secs| secs * 1_000_000)
                .collect(),
        )
    }

    pub fn observe(&self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &boundary) in self.buckets.iter().enumerate() {
            if micros <= boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_micros(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_micros() / 1000.0
    }

    pub fn bucket_boundaries(&self) -> &[u64] {
        &self.buckets
    }

    /// Non-cumulative bucket counts
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    pub fn sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new_latency()
    }
}

/// All service metrics
#[derive(Debug)]
pub struct ServiceMetrics {
    // Run metrics
    pub imports_started: Counter,
    pub imports_completed: Counter,
    pub imports_failed: Counter,
    pub imports_cancelled: Counter,
    pub imports_active: Gauge,
    pub import_duration: Histogram,

    // Record metrics
    pub records_created: Counter,
    pub records_updated: Counter,
    pub records_skipped: Counter,
    pub records_errored: Counter,

    pub previews_served: Counter,

    // HTTP metrics
    pub http_requests_total: Counter,
    pub http_request_latency: Histogram,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self {
            imports_started: Counter::new(),
            imports_completed: Counter::new(),
            imports_failed: Counter::new(),
            imports_cancelled: Counter::new(),
            imports_active: Gauge::new(),
            import_duration: Histogram::new_run_duration(),
            records_created: Counter::new(),
            records_updated: Counter::new(),
            records_skipped: Counter::new(),
            records_errored: Counter::new(),
            previews_served: Counter::new(),
            http_requests_total: Counter::new(),
            http_request_latency: Histogram::new_latency(),
        }
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shareable metrics instance
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a finished run's record counters
    pub fn record_summary(&self, summary: &RunSummary) {
        self.records_created.add(summary.created);
        self.records_updated.add(summary.updated);
        self.records_skipped.add(summary.skipped);
        self.records_errored.add(summary.errors);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            imports_started: self.imports_started.get(),
            imports_completed: self.imports_completed.get(),
            imports_failed: self.imports_failed.get(),
            imports_cancelled: self.imports_cancelled.get(),
            imports_active: self.imports_active.get(),
            import_duration_ms: self.import_duration.mean_ms(),

            records_created: self.records_created.get(),
            records_updated: self.records_updated.get(),
            records_skipped: self.records_skipped.get(),
            records_errored: self.records_errored.get(),

            previews_served: self.previews_served.get(),

            http_requests_total: self.http_requests_total.get(),
            http_request_latency_ms: self.http_request_latency.mean_ms(),
        }
    }

    /// Export all metrics in Prometheus exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(4096);

        write_counter(&mut out, "feedsync_imports_started_total", "Import runs started", self.imports_started.get());
        write_counter(&mut out, "feedsync_imports_completed_total", "Import runs completed", self.imports_completed.get());
        write_counter(&mut out, "feedsync_imports_failed_total", "Import runs failed", self.imports_failed.get());
        write_counter(&mut out, "feedsync_imports_cancelled_total", "Import runs cancelled", self.imports_cancelled.get());
        write_gauge(&mut out, "feedsync_imports_active", "Import runs in flight", self.imports_active.get());
        write_histogram(&mut out, "feedsync_import_duration_seconds", "Import run duration in seconds", &self.import_duration);

        write_counter(&mut out, "feedsync_records_created_total", "Products created by imports", self.records_created.get());
        write_counter(&mut out, "feedsync_records_updated_total", "Products updated by imports", self.records_updated.get());
        write_counter(&mut out, "feedsync_records_skipped_total", "Records rejected by validation", self.records_skipped.get());
        write_counter(&mut out, "feedsync_records_errored_total", "Records that failed to persist", self.records_errored.get());

        write_counter(&mut out, "feedsync_previews_total", "Feed previews served", self.previews_served.get());

        write_counter(&mut out, "feedsync_http_requests_total", "Total HTTP requests", self.http_requests_total.get());
        write_histogram(&mut out, "feedsync_http_request_latency_seconds", "HTTP request latency in seconds", &self.http_request_latency);

        out
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} gauge", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_histogram(out: &mut String, name: &str, help: &str, hist: &Histogram) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    let boundaries = hist.bucket_boundaries();
    let counts = hist.bucket_counts();

    // Prometheus buckets are cumulative
    let mut cumulative: u64 = 0;
    for (i, &boundary) in boundaries.iter().enumerate() {
        cumulative += counts[i];
        let le_seconds = boundary as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_bucket{{le=\"{:.3}\"}} {}", name, le_seconds, cumulative);
    }
    let total_count = hist.count();
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, total_count);

    let sum_seconds = hist.sum_micros() as f64 / 1_000_000.0;
    let _ = writeln!(out, "{}_sum {:.6}", name, sum_seconds);
    let _ = writeln!(out, "{}_count {}", name, total_count);
    let _ = writeln!(out);
}

/// Point-in-time snapshot served by `/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub imports_started: u64,
    pub imports_completed: u64,
    pub imports_failed: u64,
    pub imports_cancelled: u64,
    pub imports_active: u64,
    pub import_duration_ms: f64,

    pub records_created: u64,
    pub records_updated: u64,
    pub records_skipped: u64,
    pub records_errored: u64,

    pub previews_served: u64,

    pub http_requests_total: u64,
    pub http_request_latency_ms: f64,
}

/// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record to histogram and return elapsed
    pub fn record(self, histogram: &Histogram) -> Duration {
        let elapsed = self.elapsed();
        histogram.observe(elapsed);
        elapsed
    }
}
