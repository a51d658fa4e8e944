//! feedsync: multi-vendor product feed importer
//!
//! Pulls product feeds published by vendors in XML, JSON or CSV and
//! reconciles them into one normalized catalog:
//! - Format detection and streaming-tolerant extractors
//! - Synonym-based field mapping with per-feed overrides
//! - EAN/SKU matched upserts with category tree resolution
//! - Background runs with live progress and cancellation
//! - HTTP API for feed management, previews and run control

pub mod config;
pub mod daemon;
pub mod fetch;
pub mod import;
pub mod search;
pub mod store;
pub mod types;

pub use config::Config;
pub use types::*;
