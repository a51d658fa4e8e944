//! Service Module
//!
//! Long-running feedsync service: HTTP API, background import runs and
//! process metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       feedsync serve                          │
//! │                                                               │
//! │  ┌────────────────┐   trigger   ┌──────────────────────────┐  │
//! │  │  HTTP API      │ ──────────▶ │  Run Manager             │  │
//! │  │  (axum)        │             │  one task per feed run   │  │
//! │  └───────┬────────┘             └────────────┬─────────────┘  │
//! │          │ poll                              │                │
//! │          ▼                                   ▼                │
//! │  ┌────────────────┐   updates   ┌──────────────────────────┐  │
//! │  │ Progress       │ ◀────────── │  Import Coordinator      │  │
//! │  │ Tracker        │             │  → Catalog Store         │  │
//! │  └────────────────┘             └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod jobs;
pub mod lifecycle;
pub mod metrics;

pub use http::{AppState, HttpServer};
pub use jobs::{RunError, RunManager};
pub use lifecycle::{build_coordinator, Service};
pub use metrics::{MetricsSnapshot, ServiceMetrics, Timer};
