//! In-process store backed by hash maps

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{CatalogStore, FeedStore, ProductFields, StoreError, FEED_STATUS_RUNNING};
use crate::import::slug::slugify;
use crate::types::{CategoryId, FeedDefinition, FeedId, Param, ProductDocument, ProductId};

/// A product row as held by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub id: ProductId,
    pub fields: ProductFields,
    pub stock_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category row as held by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCategory {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
}

#[derive(Default)]
struct Inner {
    feeds: HashMap<FeedId, FeedDefinition>,
    products: HashMap<ProductId, StoredProduct>,
    categories: HashMap<(Option<CategoryId>, String), StoredCategory>,
    attributes: HashMap<ProductId, Vec<Param>>,
    images: HashMap<ProductId, Vec<String>>,
}

/// Store that keeps everything in memory, enforcing the same uniqueness
/// rules as the SQL schema
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(&self, id: ProductId) -> Option<StoredProduct> {
        self.inner.lock().products.get(&id).cloned()
    }

    pub fn products(&self) -> Vec<StoredProduct> {
        self.inner.lock().products.values().cloned().collect()
    }

    pub fn categories(&self) -> Vec<StoredCategory> {
        self.inner.lock().categories.values().cloned().collect()
    }

    pub fn attributes(&self, id: ProductId) -> Vec<Param> {
        self.inner.lock().attributes.get(&id).cloned().unwrap_or_default()
    }

    pub fn images(&self, id: ProductId) -> Vec<String> {
        self.inner.lock().images.get(&id).cloned().unwrap_or_default()
    }
}

fn to_document(product: &StoredProduct) -> ProductDocument {
    let f = &product.fields;
    ProductDocument {
        id: product.id,
        title: f.title.clone(),
        slug: f.slug.clone(),
        description: f.description.clone(),
        ean: f.ean.clone(),
        sku: f.sku.clone(),
        brand: f.brand.clone(),
        image_url: f.image_url.clone(),
        affiliate_url: f.affiliate_url.clone(),
        category_id: f.category_id,
        price: f.price,
        feed_id: f.feed_id,
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_product_by_ean(&self, ean: &str) -> Result<Option<ProductId>, StoreError> {
        if ean.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock();
        Ok(inner.products.values().find(|p| p.fields.ean == ean).map(|p| p.id))
    }

    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<ProductId>, StoreError> {
        if sku.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock();
        Ok(inner.products.values().find(|p| p.fields.sku == sku).map(|p| p.id))
    }

    async fn create_product(&self, fields: &ProductFields) -> Result<ProductId, StoreError> {
        let mut inner = self.inner.lock();
        if !fields.ean.is_empty() && inner.products.values().any(|p| p.fields.ean == fields.ean) {
            return Err(StoreError::Conflict(format!("ean {} already exists", fields.ean)));
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        inner.products.insert(
            id,
            StoredProduct {
                id,
                fields: fields.clone(),
                stock_status: "instock".to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_product(&self, id: ProductId, fields: &ProductFields) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let product = inner
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("product {}", id)))?;

        let current = &mut product.fields;
        current.title = fields.title.clone();
        current.description = fields.description.clone();
        current.short_description = fields.short_description.clone();
        current.brand = fields.brand.clone();
        current.image_url = fields.image_url.clone();
        current.affiliate_url = fields.affiliate_url.clone();
        current.price = fields.price;
        if fields.category_id.is_some() {
            current.category_id = fields.category_id;
        }
        if fields.feed_id.is_some() {
            current.feed_id = fields.feed_id;
        }
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn find_or_create_category(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
    ) -> Result<CategoryId, StoreError> {
        let slug = slugify(name);
        let mut inner = self.inner.lock();
        let category = inner
            .categories
            .entry((parent_id, slug.clone()))
            .or_insert_with(|| StoredCategory {
                id: Uuid::new_v4(),
                name: name.trim().to_string(),
                slug,
                parent_id,
            });
        Ok(category.id)
    }

    async fn replace_attributes(&self, product_id: ProductId, attributes: &[Param]) -> Result<(), StoreError> {
        self.inner.lock().attributes.insert(product_id, attributes.to_vec());
        Ok(())
    }

    async fn replace_images(&self, product_id: ProductId, urls: &[String]) -> Result<(), StoreError> {
        self.inner.lock().images.insert(product_id, urls.to_vec());
        Ok(())
    }

    async fn products_for_feed(&self, feed_id: FeedId) -> Result<Vec<ProductDocument>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .products
            .values()
            .filter(|p| p.fields.feed_id == Some(feed_id))
            .map(to_document)
            .collect())
    }

    async fn count_products(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().products.len() as u64)
    }

    async fn count_categories(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().categories.len() as u64)
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn create_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.feeds.contains_key(&feed.id) {
            return Err(StoreError::Conflict(format!("feed {}", feed.id)));
        }
        inner.feeds.insert(feed.id, feed.clone());
        Ok(())
    }

    async fn get_feed(&self, id: FeedId) -> Result<Option<FeedDefinition>, StoreError> {
        Ok(self.inner.lock().feeds.get(&id).cloned())
    }

    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, StoreError> {
        let mut feeds: Vec<FeedDefinition> = self.inner.lock().feeds.values().cloned().collect();
        feeds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(feeds)
    }

    async fn update_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        match inner.feeds.get_mut(&feed.id) {
            Some(existing) => {
                *existing = feed.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("feed {}", feed.id))),
        }
    }

    async fn delete_feed(&self, id: FeedId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().feeds.remove(&id).is_some())
    }

    async fn mark_feed_started(&self, id: FeedId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let feed = inner
            .feeds
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("feed {}", id)))?;
        feed.last_status = Some(FEED_STATUS_RUNNING.to_string());
        feed.last_run = Some(Utc::now());
        Ok(())
    }

    async fn record_feed_run_result(
        &self,
        id: FeedId,
        status: &str,
        product_count: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let feed = inner
            .feeds
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("feed {}", id)))?;
        feed.last_status = Some(status.to_string());
        if let Some(count) = product_count {
            feed.product_count = count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str, ean: &str) -> ProductFields {
        ProductFields {
            title: title.to_string(),
            slug: slugify(title),
            ean: ean.to_string(),
            price: 1.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_ean_conflicts() {
        let store = MemoryStore::new();
        store.create_product(&fields("A", "123")).await.unwrap();
        let err = store.create_product(&fields("B", "123")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Empty EANs never collide
        store.create_product(&fields("C", "")).await.unwrap();
        store.create_product(&fields("D", "")).await.unwrap();
        assert_eq!(store.count_products().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let store = MemoryStore::new();
        let mut original = fields("Old", "123");
        original.sku = "SKU-1".into();
        let id = store.create_product(&original).await.unwrap();

        let mut update = fields("New", "999");
        update.sku = "OTHER".into();
        update.price = 5.0;
        store.update_product(id, &update).await.unwrap();

        let stored = store.product(id).unwrap();
        assert_eq!(stored.fields.title, "New");
        assert_eq!(stored.fields.price, 5.0);
        assert_eq!(stored.fields.ean, "123");
        assert_eq!(stored.fields.sku, "SKU-1");
        assert_eq!(stored.fields.slug, "old");
    }

    #[tokio::test]
    async fn test_category_find_or_create() {
        let store = MemoryStore::new();
        let root = store.find_or_create_category("Electronics", None).await.unwrap();
        let again = store.find_or_create_category(" electronics ", None).await.unwrap();
        assert_eq!(root, again);

        let child = store.find_or_create_category("Phones", Some(root)).await.unwrap();
        let other_root = store.find_or_create_category("Phones", None).await.unwrap();
        assert_ne!(child, other_root);
        assert_eq!(store.count_categories().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_feed_run_bookkeeping() {
        let store = MemoryStore::new();
        let feed = FeedDefinition::new("Shop", "/tmp/feed.xml");
        store.create_feed(&feed).await.unwrap();

        store.mark_feed_started(feed.id).await.unwrap();
        let running = store.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(running.last_status.as_deref(), Some("running"));
        assert!(running.last_run.is_some());

        store.record_feed_run_result(feed.id, "completed", Some(42)).await.unwrap();
        store.record_feed_run_result(feed.id, "failed", None).await.unwrap();
        let done = store.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(done.last_status.as_deref(), Some("failed"));
        assert_eq!(done.product_count, 42);

        assert!(store.delete_feed(feed.id).await.unwrap());
        assert!(!store.delete_feed(feed.id).await.unwrap());
        assert!(matches!(
            store.mark_feed_started(feed.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
