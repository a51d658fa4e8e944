//! HTTP API Request/Response Types
//!
//! JSON-serializable types for the HTTP API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::daemon::metrics::MetricsSnapshot;
use crate::fetch::FeedLocation;
use crate::import::{CanonicalField, PreviewRequest};
use crate::types::{FeedDefinition, FeedFormat, FeedId, FeedUpdate};

/// Body of `POST /feeds`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFeedRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// `xml`, `json` or `csv`; auto-detected when absent
    #[serde(default, alias = "type")]
    pub format: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub item_element: Option<String>,
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl CreateFeedRequest {
    /// Validate and turn into a new feed definition
    pub fn into_feed(self) -> Result<FeedDefinition, String> {
        let mut feed = FeedDefinition::new(self.name.trim(), self.url.trim());
        FeedUpdate {
            format: parse_format(self.format.as_deref())?,
            vendor_id: self.vendor_id,
            schedule: self.schedule,
            item_element: self.item_element,
            field_mapping: Some(self.field_mapping),
            active: self.active,
            ..Default::default()
        }
        .apply(&mut feed);
        validate_feed(&feed)?;
        Ok(feed)
    }
}

/// Body of `PUT /feeds/:id`; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFeedRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "type")]
    pub format: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub item_element: Option<String>,
    #[serde(default)]
    pub field_mapping: Option<HashMap<String, String>>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl UpdateFeedRequest {
    /// Apply onto an existing feed, validating the result
    pub fn apply_to(self, feed: &mut FeedDefinition) -> Result<(), String> {
        FeedUpdate {
            name: self.name.map(|n| n.trim().to_string()),
            url: self.url.map(|u| u.trim().to_string()),
            format: parse_format(self.format.as_deref())?,
            vendor_id: self.vendor_id,
            schedule: self.schedule,
            item_element: self.item_element,
            field_mapping: self.field_mapping,
            active: self.active,
        }
        .apply(feed);
        validate_feed(feed)
    }
}

fn parse_format(raw: Option<&str>) -> Result<Option<FeedFormat>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some),
    }
}

fn validate_feed(feed: &FeedDefinition) -> Result<(), String> {
    if feed.name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if feed.url.is_empty() {
        return Err("url must not be empty".to_string());
    }
    FeedLocation::parse(&feed.url).map_err(|e| e.to_string())?;
    for (raw, target) in &feed.field_mapping {
        target
            .parse::<CanonicalField>()
            .map_err(|e| format!("field_mapping[{}]: {}", raw, e))?;
    }
    Ok(())
}

/// Body of `POST /feeds/preview`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewFeedRequest {
    #[serde(default)]
    pub url: String,
    /// `xml`, `json` or `csv`; auto-detected when absent
    #[serde(default, alias = "type")]
    pub format: Option<String>,
    /// XML item element; defaults to `SHOPITEM`
    #[serde(default, alias = "item_path")]
    pub item_element: Option<String>,
}

impl PreviewFeedRequest {
    /// Validate into a coordinator preview request
    pub fn into_request(self) -> Result<PreviewRequest, String> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err("url is required".to_string());
        }
        Ok(PreviewRequest {
            url,
            format: parse_format(self.format.as_deref())?,
            item_element: self.item_element.filter(|e| !e.trim().is_empty()),
        })
    }
}

/// Response to a run trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStartedResponse {
    pub feed_id: FeedId,
    pub run_id: Uuid,
    pub status: String,
}

/// Response to a cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub feed_id: FeedId,
    pub run_id: Uuid,
    pub status: String,
}

/// Feed list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedListResponse {
    pub feeds: Vec<FeedDefinition>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the service is healthy
    pub healthy: bool,
    /// Service version
    pub version: String,
}

/// Stats response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_products: u64,
    pub total_categories: u64,
    pub total_feeds: u64,
    pub active_runs: u64,
    pub metrics: MetricsSnapshot,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Invalid or missing API key")
    }
}
