//! Catalog and feed persistence
//!
//! The import pipeline talks to storage only through [`CatalogStore`] and
//! [`FeedStore`]. Two backends are provided: [`SqliteStore`] for real
//! deployments and [`MemoryStore`] for dry runs and tests.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoredCategory, StoredProduct};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CategoryId, FeedDefinition, FeedId, Param, ProductDocument, ProductId};

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Column values written when a product is created or refreshed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFields {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub short_description: String,
    pub ean: String,
    pub sku: String,
    pub brand: String,
    pub image_url: String,
    pub affiliate_url: String,
    pub category_id: Option<CategoryId>,
    pub price: f64,
    pub feed_id: Option<FeedId>,
}

/// Product and category persistence used by the reconciler
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_product_by_ean(&self, ean: &str) -> Result<Option<ProductId>, StoreError>;

    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<ProductId>, StoreError>;

    /// Insert a product. A duplicate non-empty EAN is `StoreError::Conflict`.
    async fn create_product(&self, fields: &ProductFields) -> Result<ProductId, StoreError>;

    /// Refresh a product's descriptive fields. EAN, SKU and slug are
    /// identity and stay as they were at creation; a `None` category
    /// keeps the current one.
    async fn update_product(&self, id: ProductId, fields: &ProductFields) -> Result<(), StoreError>;

    /// Look up the category `(parent, slug(name))`, creating it if absent.
    /// Concurrent callers for the same pair get the same id.
    async fn find_or_create_category(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
    ) -> Result<CategoryId, StoreError>;

    /// Replace the product's attribute set
    async fn replace_attributes(&self, product_id: ProductId, attributes: &[Param]) -> Result<(), StoreError>;

    /// Replace the product's images; the first URL is the main image
    async fn replace_images(&self, product_id: ProductId, urls: &[String]) -> Result<(), StoreError>;

    /// Search documents for every product owned by a feed
    async fn products_for_feed(&self, feed_id: FeedId) -> Result<Vec<ProductDocument>, StoreError>;

    async fn count_products(&self) -> Result<u64, StoreError>;

    async fn count_categories(&self) -> Result<u64, StoreError>;
}

/// Feed definition persistence
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn create_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError>;

    async fn get_feed(&self, id: FeedId) -> Result<Option<FeedDefinition>, StoreError>;

    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, StoreError>;

    /// Overwrite a feed's configuration; `StoreError::NotFound` if missing
    async fn update_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError>;

    /// Returns whether a feed was removed
    async fn delete_feed(&self, id: FeedId) -> Result<bool, StoreError>;

    /// Flag a run as started: status `running`, last run now
    async fn mark_feed_started(&self, id: FeedId) -> Result<(), StoreError>;

    /// Persist the outcome of a run; the product count is left alone when `None`
    async fn record_feed_run_result(
        &self,
        id: FeedId,
        status: &str,
        product_count: Option<u64>,
    ) -> Result<(), StoreError>;
}

/// Everything the daemon needs from storage
pub trait Store: CatalogStore + FeedStore {}

impl<T: CatalogStore + FeedStore> Store for T {}

/// Feed status persisted while a run is in flight
pub const FEED_STATUS_RUNNING: &str = "running";
