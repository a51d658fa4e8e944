//! Core types shared across the import pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a feed definition
pub type FeedId = Uuid;

/// Unique identifier for a catalog product
pub type ProductId = Uuid;

/// Unique identifier for a category
pub type CategoryId = Uuid;

/// Default name of the repeated item element in XML feeds
pub const DEFAULT_ITEM_ELEMENT: &str = "SHOPITEM";

// ============================================================================
// Feed definitions
// ============================================================================

/// Payload format of a vendor feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Xml,
    Json,
    Csv,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Xml => "xml",
            FeedFormat::Json => "json",
            FeedFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(FeedFormat::Xml),
            "json" => Ok(FeedFormat::Json),
            "csv" => Ok(FeedFormat::Csv),
            other => Err(format!("unknown feed format: {}", other)),
        }
    }
}

/// Persisted configuration for one vendor feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedDefinition {
    pub id: FeedId,
    pub name: String,
    /// Remote URL or absolute local path
    pub url: String,
    /// Declared payload format; `None` means auto-detect
    pub format: Option<FeedFormat>,
    pub vendor_id: Option<String>,
    /// Informational schedule string (e.g. "daily")
    pub schedule: Option<String>,
    pub item_element: String,
    /// Raw field name -> canonical field name
    pub field_mapping: HashMap<String, String>,
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub product_count: u64,
    pub created_at: DateTime<Utc>,
}

impl FeedDefinition {
    /// Create a new active feed with defaults for everything but name and URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            format: None,
            vendor_id: None,
            schedule: None,
            item_element: DEFAULT_ITEM_ELEMENT.to_string(),
            field_mapping: HashMap::new(),
            active: true,
            last_run: None,
            last_status: None,
            product_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_format(mut self, format: FeedFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_item_element(mut self, element: impl Into<String>) -> Self {
        self.item_element = element.into();
        self
    }

    pub fn with_mapping(mut self, raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.field_mapping.insert(raw.into(), canonical.into());
        self
    }
}

/// Editable subset of a feed definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub format: Option<FeedFormat>,
    pub vendor_id: Option<String>,
    pub schedule: Option<String>,
    pub item_element: Option<String>,
    pub field_mapping: Option<HashMap<String, String>>,
    pub active: Option<bool>,
}

impl FeedUpdate {
    /// Apply the present fields onto a feed definition
    pub fn apply(self, feed: &mut FeedDefinition) {
        if let Some(name) = self.name {
            feed.name = name;
        }
        if let Some(url) = self.url {
            feed.url = url;
        }
        if let Some(format) = self.format {
            feed.format = Some(format);
        }
        if let Some(vendor_id) = self.vendor_id {
            feed.vendor_id = Some(vendor_id);
        }
        if let Some(schedule) = self.schedule {
            feed.schedule = Some(schedule);
        }
        if let Some(element) = self.item_element {
            feed.item_element = element;
        }
        if let Some(mapping) = self.field_mapping {
            feed.field_mapping = mapping;
        }
        if let Some(active) = self.active {
            feed.active = active;
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A scalar value as it appeared in the source payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    Number(f64),
}

impl RawValue {
    /// Text form of the value, trimmed
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.trim().to_string(),
            RawValue::Number(n) => format_number(*n),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A vendor name/value parameter attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One parsed item from a feed, keyed by raw (vendor) field names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub fields: HashMap<String, RawValue>,
    /// Vendor parameters in source order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    /// Alternate image URLs in source order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name)
    }

    /// Insert a field unless the name was already seen or the value is empty
    pub fn insert_first(&mut self, name: impl Into<String>, value: RawValue) {
        if value.is_empty() {
            return;
        }
        self.fields.entry(name.into()).or_insert(value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.params.is_empty() && self.images.is_empty()
    }
}

/// A record after field mapping: fixed canonical shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub ean: String,
    pub sku: String,
    pub brand: String,
    pub image_url: String,
    pub affiliate_url: String,
    pub category_path: String,
    pub price: f64,
    #[serde(default)]
    pub attributes: Vec<Param>,
    /// Alternate images, excluding `image_url`
    #[serde(default)]
    pub gallery: Vec<String>,
}

impl NormalizedRecord {
    /// Reason the record cannot be persisted, if any
    pub fn rejection(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            Some("missing title")
        } else if self.price.is_nan() || self.price <= 0.0 {
            Some("non-positive price")
        } else {
            None
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Denormalized product view pushed to the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub id: ProductId,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub ean: String,
    pub sku: String,
    pub brand: String,
    pub image_url: String,
    pub affiliate_url: String,
    pub category_id: Option<CategoryId>,
    pub price: f64,
    pub feed_id: Option<FeedId>,
}
