//! Core types and traits shared by the feed extractors

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::store::StoreError;
use crate::types::{FeedFormat, RawRecord};

/// Number of sample records returned by preview mode
pub const PREVIEW_SAMPLE_SIZE: usize = 5;

/// Trait for parsers that turn a feed payload into raw records
///
/// Extractors never fail: input they cannot make sense of yields zero
/// records, and a malformed tail keeps the records parsed before it.
pub trait FeedExtractor: Send + Sync {
    /// Format handled by this extractor
    fn format(&self) -> FeedFormat;

    /// Walk the payload, materializing at most `limit` records while
    /// still counting every item. `None` materializes everything.
    fn scan(&self, data: &[u8], limit: Option<usize>) -> ScanResult;

    /// Extract every record in the payload
    fn extract(&self, data: &[u8]) -> Vec<RawRecord> {
        self.scan(data, None).records
    }

    /// Bounded preview: sample records, total count and field names
    fn preview(&self, data: &[u8]) -> FeedPreview {
        let scan = self.scan(data, Some(PREVIEW_SAMPLE_SIZE));
        let fields = scan.field_names();
        FeedPreview {
            detected_type: self.format(),
            total_items: scan.total,
            sample: scan.records,
            fields,
            truncated: false,
        }
    }
}

/// Result of one pass over a payload
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Materialized records (all of them, or the first `limit`)
    pub records: Vec<RawRecord>,
    /// Total number of items seen
    pub total: u64,
    /// Column names known up front (CSV header)
    pub header: Vec<String>,
}

impl ScanResult {
    /// Union of the header and every field name seen in the materialized records
    pub fn field_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.header.iter().cloned().collect();
        for record in &self.records {
            names.extend(record.fields.keys().cloned());
        }
        names.into_iter().collect()
    }
}

/// What a feed looks like, without importing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPreview {
    pub detected_type: FeedFormat,
    pub total_items: u64,
    pub sample: Vec<RawRecord>,
    pub fields: Vec<String>,
    /// Payload was cut at the preview byte cap; counts cover the bytes read
    pub truncated: bool,
}

/// Ad-hoc preview of a feed that need not be registered
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub url: String,
    /// Declared format; auto-detected when absent
    #[serde(default, alias = "type")]
    pub format: Option<FeedFormat>,
    /// XML item element; defaults to `SHOPITEM`
    #[serde(default, alias = "item_path")]
    pub item_element: Option<String>,
}

/// Errors that end an import run
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("feed contains no items")]
    NoItems,

    #[error("parser task failed: {0}")]
    Parser(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("import cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for ImportError {
    fn from(e: tokio::task::JoinError) -> Self {
        ImportError::Parser(e.to_string())
    }
}
