//! SQLite store on sqlx

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{CatalogStore, FeedStore, ProductFields, StoreError, FEED_STATUS_RUNNING};
use crate::import::slug::slugify;
use crate::types::{CategoryId, FeedDefinition, FeedFormat, FeedId, Param, ProductDocument, ProductId};

const FEED_COLUMNS: &str = "id, name, url, format, vendor_id, schedule, item_element, field_mapping, \
     active, last_run, last_status, product_count, created_at";

/// Store backed by a SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Opened catalog database {}", url);
        Ok(store)
    }

    /// Private in-memory database, for tests and dry runs
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection to :memory: is a separate database, so pin exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("bad id {:?}: {}", value, e)))
}

fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>, StoreError> {
    value.as_deref().map(parse_uuid).transpose()
}

fn feed_from_row(row: &SqliteRow) -> Result<FeedDefinition, StoreError> {
    let id: String = row.try_get("id")?;
    let format: Option<String> = row.try_get("format")?;
    let format = match format {
        Some(f) => Some(FeedFormat::from_str(&f).map_err(StoreError::Corrupt)?),
        None => None,
    };
    let mapping: String = row.try_get("field_mapping")?;
    let field_mapping: HashMap<String, String> = serde_json::from_str(&mapping)?;
    let product_count: i64 = row.try_get("product_count")?;

    Ok(FeedDefinition {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        format,
        vendor_id: row.try_get("vendor_id")?,
        schedule: row.try_get("schedule")?,
        item_element: row.try_get("item_element")?,
        field_mapping,
        active: row.try_get("active")?,
        last_run: row.try_get::<Option<DateTime<Utc>>, _>("last_run")?,
        last_status: row.try_get("last_status")?,
        product_count: product_count.max(0) as u64,
        created_at: row.try_get("created_at")?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<ProductDocument, StoreError> {
    let id: String = row.try_get("id")?;
    Ok(ProductDocument {
        id: parse_uuid(&id)?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        ean: row.try_get("ean")?,
        sku: row.try_get("sku")?,
        brand: row.try_get("brand")?,
        image_url: row.try_get("image_url")?,
        affiliate_url: row.try_get("affiliate_url")?,
        category_id: parse_optional_uuid(row.try_get("category_id")?)?,
        price: row.try_get("price_max")?,
        feed_id: parse_optional_uuid(row.try_get("feed_id")?)?,
    })
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn find_product_by_ean(&self, ean: &str) -> Result<Option<ProductId>, StoreError> {
        if ean.is_empty() {
            return Ok(None);
        }
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE ean = ? LIMIT 1")
            .bind(ean)
            .fetch_optional(&self.pool)
            .await?;
        parse_optional_uuid(id)
    }

    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<ProductId>, StoreError> {
        if sku.is_empty() {
            return Ok(None);
        }
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM products WHERE sku = ? ORDER BY created_at LIMIT 1")
                .bind(sku)
                .fetch_optional(&self.pool)
                .await?;
        parse_optional_uuid(id)
    }

    async fn create_product(&self, fields: &ProductFields) -> Result<ProductId, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO products (id, title, slug, description, short_description, ean, sku, brand, \
             image_url, affiliate_url, category_id, price_min, price_max, stock_status, feed_id, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'instock', ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&fields.title)
        .bind(&fields.slug)
        .bind(&fields.description)
        .bind(&fields.short_description)
        .bind(&fields.ean)
        .bind(&fields.sku)
        .bind(&fields.brand)
        .bind(&fields.image_url)
        .bind(&fields.affiliate_url)
        .bind(fields.category_id.map(|c| c.to_string()))
        .bind(fields.price)
        .bind(fields.price)
        .bind(fields.feed_id.map(|f| f.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_product(&self, id: ProductId, fields: &ProductFields) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET title = ?, description = ?, short_description = ?, brand = ?, \
             image_url = ?, affiliate_url = ?, price_min = ?, price_max = ?, \
             category_id = COALESCE(?, category_id), feed_id = COALESCE(?, feed_id), updated_at = ? \
             WHERE id = ?",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.short_description)
        .bind(&fields.brand)
        .bind(&fields.image_url)
        .bind(&fields.affiliate_url)
        .bind(fields.price)
        .bind(fields.price)
        .bind(fields.category_id.map(|c| c.to_string()))
        .bind(fields.feed_id.map(|f| f.to_string()))
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("product {}", id)));
        }
        Ok(())
    }

    async fn find_or_create_category(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
    ) -> Result<CategoryId, StoreError> {
        let slug = slugify(name);
        let parent_key = parent_id.map(|p| p.to_string()).unwrap_or_default();
        let lookup = "SELECT id FROM categories WHERE IFNULL(parent_id, '') = ? AND slug = ?";

        let existing: Option<String> = sqlx::query_scalar(lookup)
            .bind(&parent_key)
            .bind(&slug)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(id) = existing {
            return parse_uuid(&id);
        }

        // A concurrent insert of the same (parent, slug) loses quietly; the
        // relookup below returns whichever row survived
        sqlx::query("INSERT OR IGNORE INTO categories (id, name, slug, parent_id) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(name.trim())
            .bind(&slug)
            .bind(parent_id.map(|p| p.to_string()))
            .execute(&self.pool)
            .await?;

        let id: String = sqlx::query_scalar(lookup)
            .bind(&parent_key)
            .bind(&slug)
            .fetch_one(&self.pool)
            .await?;
        parse_uuid(&id)
    }

    async fn replace_attributes(&self, product_id: ProductId, attributes: &[Param]) -> Result<(), StoreError> {
        let product_id = product_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_attributes WHERE product_id = ?")
            .bind(&product_id)
            .execute(&mut *tx)
            .await?;

        for param in attributes {
            sqlx::query(
                "INSERT INTO product_attributes (product_id, attribute_name, attribute_slug, attribute_value) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&product_id)
            .bind(&param.name)
            .bind(slugify(&param.name))
            .bind(&param.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_images(&self, product_id: ProductId, urls: &[String]) -> Result<(), StoreError> {
        let product_id = product_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_images WHERE product_id = ?")
            .bind(&product_id)
            .execute(&mut *tx)
            .await?;

        for (position, url) in urls.iter().enumerate() {
            sqlx::query("INSERT INTO product_images (product_id, url, position, is_main) VALUES (?, ?, ?, ?)")
                .bind(&product_id)
                .bind(url)
                .bind(position as i64)
                .bind(position == 0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn products_for_feed(&self, feed_id: FeedId) -> Result<Vec<ProductDocument>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, slug, description, ean, sku, brand, image_url, affiliate_url, \
             category_id, price_max, feed_id FROM products WHERE feed_id = ?",
        )
        .bind(feed_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn count_products(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_categories(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl FeedStore for SqliteStore {
    async fn create_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO feeds (id, name, url, format, vendor_id, schedule, item_element, field_mapping, \
             active, last_run, last_status, product_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(feed.id.to_string())
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.format.map(|f| f.as_str()))
        .bind(&feed.vendor_id)
        .bind(&feed.schedule)
        .bind(&feed.item_element)
        .bind(serde_json::to_string(&feed.field_mapping)?)
        .bind(feed.active)
        .bind(feed.last_run)
        .bind(&feed.last_status)
        .bind(feed.product_count as i64)
        .bind(feed.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_feed(&self, id: FeedId) -> Result<Option<FeedDefinition>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM feeds WHERE id = ?", FEED_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(feed_from_row).transpose()
    }

    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {} FROM feeds ORDER BY created_at, name", FEED_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(feed_from_row).collect()
    }

    async fn update_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE feeds SET name = ?, url = ?, format = ?, vendor_id = ?, schedule = ?, \
             item_element = ?, field_mapping = ?, active = ? WHERE id = ?",
        )
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.format.map(|f| f.as_str()))
        .bind(&feed.vendor_id)
        .bind(&feed.schedule)
        .bind(&feed.item_element)
        .bind(serde_json::to_string(&feed.field_mapping)?)
        .bind(feed.active)
        .bind(feed.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed {}", feed.id)));
        }
        Ok(())
    }

    async fn delete_feed(&self, id: FeedId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_feed_started(&self, id: FeedId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE feeds SET last_status = ?, last_run = ? WHERE id = ?")
            .bind(FEED_STATUS_RUNNING)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed {}", id)));
        }
        Ok(())
    }

    async fn record_feed_run_result(
        &self,
        id: FeedId,
        status: &str,
        product_count: Option<u64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE feeds SET last_status = ?, product_count = COALESCE(?, product_count) WHERE id = ?",
        )
        .bind(status)
        .bind(product_count.map(|c| c as i64))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_feed_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let feed = FeedDefinition::new("Heureka shop", "https://shop.example.com/heureka.xml")
            .with_format(FeedFormat::Xml)
            .with_mapping("NAZOV", "title");
        store.create_feed(&feed).await.unwrap();

        let loaded = store.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, feed.name);
        assert_eq!(loaded.format, Some(FeedFormat::Xml));
        assert_eq!(loaded.field_mapping.get("NAZOV").map(String::as_str), Some("title"));
        assert!(loaded.active);

        store.mark_feed_started(feed.id).await.unwrap();
        store.record_feed_run_result(feed.id, "completed", Some(7)).await.unwrap();
        let loaded = store.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(loaded.last_status.as_deref(), Some("completed"));
        assert_eq!(loaded.product_count, 7);
        assert!(loaded.last_run.is_some());

        assert_eq!(store.list_feeds().await.unwrap().len(), 1);
        assert!(store.delete_feed(feed.id).await.unwrap());
        assert!(store.get_feed(feed.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_ean_is_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        let fields = ProductFields {
            title: "Phone".into(),
            slug: "phone".into(),
            ean: "8590000000011".into(),
            price: 100.0,
            ..Default::default()
        };
        let id = store.create_product(&fields).await.unwrap();
        assert_eq!(store.find_product_by_ean("8590000000011").await.unwrap(), Some(id));

        let err = store.create_product(&fields).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_category_chain_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let root = store.find_or_create_category("Elektronika", None).await.unwrap();
        let child = store.find_or_create_category("Mobilné telefóny", Some(root)).await.unwrap();

        assert_eq!(store.find_or_create_category("Elektronika", None).await.unwrap(), root);
        assert_eq!(
            store.find_or_create_category("Mobilne telefony", Some(root)).await.unwrap(),
            child
        );
        assert_eq!(store.count_categories().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_category_creation_on_shared_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let store = Arc::new(SqliteStore::connect(&url, 4).await.unwrap());

        let tasks = (0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut parent = None;
                for name in ["Electronics", "Phones", "Smartphones"] {
                    parent = Some(store.find_or_create_category(name, parent).await.unwrap());
                }
                parent.unwrap()
            })
        });
        let leaves: Vec<CategoryId> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert!(leaves.windows(2).all(|pair| pair[0] == pair[1]), "{:?}", leaves);
        assert_eq!(store.count_categories().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_replace_attributes_and_images() {
        let store = SqliteStore::in_memory().await.unwrap();
        let id = store
            .create_product(&ProductFields {
                title: "Lamp".into(),
                slug: "lamp".into(),
                price: 10.0,
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .replace_attributes(id, &[Param::new("Color", "Red"), Param::new("Výška", "30 cm")])
            .await
            .unwrap();
        store.replace_attributes(id, &[Param::new("Color", "Blue")]).await.unwrap();
        store
            .replace_images(id, &["https://a/1.jpg".to_string(), "https://a/2.jpg".to_string()])
            .await
            .unwrap();

        let attrs: Vec<(String, String)> = sqlx::query_as(
            "SELECT attribute_slug, attribute_value FROM product_attributes WHERE product_id = ?",
        )
        .bind(id.to_string())
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(attrs, vec![("color".to_string(), "Blue".to_string())]);

        let main: String =
            sqlx::query_scalar("SELECT url FROM product_images WHERE product_id = ? AND is_main = 1")
                .bind(id.to_string())
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(main, "https://a/1.jpg");
    }
}
