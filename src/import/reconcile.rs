//! Create-or-update of normalized records against the catalog
//!
//! Matching is by natural key: EAN first, then SKU. A record that matches
//! nothing creates a new product. Category paths are resolved root to
//! leaf, creating missing levels on the way.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::slug::{slugify, split_category_path};
use crate::store::{CatalogStore, ProductFields, StoreError};
use crate::types::{CategoryId, FeedId, NormalizedRecord, ProductId};

/// Result of reconciling one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(ProductId),
    Updated(ProductId),
    /// Record failed validation and was not persisted
    Skipped(&'static str),
}

/// Reconciles records for one import run
///
/// Resolved category paths are cached for the lifetime of the reconciler,
/// so a run touches the category table once per distinct path.
pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
    feed_id: Option<FeedId>,
    categories: DashMap<String, Option<CategoryId>>,
}

impl<S: CatalogStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            feed_id: None,
            categories: DashMap::new(),
        }
    }

    /// Record the owning feed on created and updated products
    pub fn with_feed(mut self, feed_id: FeedId) -> Self {
        self.feed_id = Some(feed_id);
        self
    }

    pub async fn reconcile(&self, record: &NormalizedRecord) -> Result<ReconcileOutcome, StoreError> {
        if let Some(reason) = record.rejection() {
            return Ok(ReconcileOutcome::Skipped(reason));
        }

        let existing = self.find_existing(record).await?;
        let category_id = self.resolve_category(&record.category_path).await?;
        let fields = self.fields(record, category_id);

        match existing {
            Some(id) => {
                self.store.update_product(id, &fields).await?;
                self.replace_children(id, record, true).await?;
                Ok(ReconcileOutcome::Updated(id))
            }
            None => match self.store.create_product(&fields).await {
                Ok(id) => {
                    self.replace_children(id, record, false).await?;
                    Ok(ReconcileOutcome::Created(id))
                }
                Err(StoreError::Conflict(detail)) => {
                    // Another worker created the same EAN between our lookup and insert
                    debug!("Create raced on EAN {}: {}", record.ean, detail);
                    let id = self
                        .store
                        .find_product_by_ean(&record.ean)
                        .await?
                        .ok_or(StoreError::Conflict(detail))?;
                    self.store.update_product(id, &fields).await?;
                    self.replace_children(id, record, true).await?;
                    Ok(ReconcileOutcome::Updated(id))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// EAN match wins over SKU match
    async fn find_existing(&self, record: &NormalizedRecord) -> Result<Option<ProductId>, StoreError> {
        if !record.ean.is_empty() {
            if let Some(id) = self.store.find_product_by_ean(&record.ean).await? {
                return Ok(Some(id));
            }
        }
        if !record.sku.is_empty() {
            return self.store.find_product_by_sku(&record.sku).await;
        }
        Ok(None)
    }

    /// Leaf category id for a path, `None` for an empty path
    pub async fn resolve_category(&self, path: &str) -> Result<Option<CategoryId>, StoreError> {
        let key = path.trim();
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.categories.get(key) {
            return Ok(*cached);
        }

        let mut parent: Option<CategoryId> = None;
        for segment in split_category_path(key) {
            if slugify(&segment).is_empty() {
                debug!("Dropping category segment {:?} of {:?}: nothing left to slug", segment, key);
                continue;
            }
            parent = Some(self.store.find_or_create_category(&segment, parent).await?);
        }

        self.categories.insert(key.to_string(), parent);
        Ok(parent)
    }

    fn fields(&self, record: &NormalizedRecord, category_id: Option<CategoryId>) -> ProductFields {
        ProductFields {
            title: record.title.clone(),
            slug: slugify(&record.title),
            description: record.description.clone(),
            short_description: record.short_description.clone(),
            ean: record.ean.clone(),
            sku: record.sku.clone(),
            brand: record.brand.clone(),
            image_url: record.image_url.clone(),
            affiliate_url: record.affiliate_url.clone(),
            category_id,
            price: record.price,
            feed_id: self.feed_id,
        }
    }

    /// Attributes and images. Updates always replace (honoring vendor-side
    /// deletions); creates only write what is there.
    async fn replace_children(&self, id: ProductId, record: &NormalizedRecord, is_update: bool) -> Result<(), StoreError> {
        if is_update || !record.attributes.is_empty() {
            self.store.replace_attributes(id, &record.attributes).await?;
        }

        let images: Vec<String> = std::iter::once(&record.image_url)
            .chain(record.gallery.iter())
            .filter(|url| !url.is_empty())
            .cloned()
            .collect();
        if is_update || !images.is_empty() {
            self.store.replace_images(id, &images).await?;
        }
        Ok(())
    }
}
