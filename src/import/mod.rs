//! Feed import pipeline
//!
//! Turns a vendor feed (XML, JSON or CSV) into catalog products.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Import Coordinator                          │
//! │            (run state machine, workers, progress, resync)           │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                        │                        │
//!          ▼                        ▼                        ▼
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   Downloader    │    │ Detect/Extract  │    │     Mapper      │
//! │ - HTTP / file   │    │ - XML stream    │    │ - explicit map  │
//! │ - preview cap   │    │ - JSON / CSV    │    │ - synonyms      │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             Reconciler                              │
//! │        (EAN → SKU → create, category chain, attributes)             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod csv_feed;
pub mod detect;
pub mod json_feed;
pub mod mapper;
pub mod progress;
pub mod reconcile;
pub mod slug;
pub mod source;
pub mod xml_feed;

// Re-export main types
pub use coordinator::{ImportCoordinator, ImportCoordinatorBuilder, RunSummary};
pub use csv_feed::CsvExtractor;
pub use detect::{detect_format, extractor_for};
pub use json_feed::JsonExtractor;
pub use mapper::{CanonicalField, FieldMapper, SynonymTable};
pub use progress::{ProgressState, ProgressTracker, RecordOutcome, RunStatus};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use source::{FeedExtractor, FeedPreview, ImportError, PreviewRequest, ScanResult};
pub use xml_feed::XmlExtractor;
