//! End-to-end import runs against the in-memory and SQLite stores

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedsync::daemon::{RunManager, ServiceMetrics};
use feedsync::fetch::{Downloader, FetchError, Payload};
use feedsync::import::{ImportCoordinator, ImportCoordinatorBuilder, PreviewRequest, RunStatus};
use feedsync::store::{CatalogStore, FeedStore, MemoryStore, ProductFields, SqliteStore, Store, StoreError};
use feedsync::types::{CategoryId, FeedDefinition, FeedFormat, FeedId, Param, ProductDocument, ProductId};
use uuid::Uuid;

/// Serves a fixed payload for every URL
struct StaticDownloader(Vec<u8>);

#[async_trait]
impl Downloader for StaticDownloader {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.0.clone())
    }

    async fn fetch_limited(&self, _url: &str, max_bytes: u64) -> Result<Payload, FetchError> {
        let max = max_bytes as usize;
        Ok(Payload {
            bytes: self.0[..self.0.len().min(max)].to_vec(),
            truncated: self.0.len() > max,
        })
    }
}

/// How [`FaultyStore`] misbehaves on a product titled `trigger`
#[derive(Clone, Copy)]
enum Fault {
    Error,
    Panic,
}

/// Memory store that breaks on one specific product
struct FaultyStore {
    inner: MemoryStore,
    trigger: &'static str,
    fault: Fault,
}

impl FaultyStore {
    fn new(trigger: &'static str, fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            trigger,
            fault,
        }
    }
}

#[async_trait]
impl CatalogStore for FaultyStore {
    async fn find_product_by_ean(&self, ean: &str) -> Result<Option<ProductId>, StoreError> {
        self.inner.find_product_by_ean(ean).await
    }

    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<ProductId>, StoreError> {
        self.inner.find_product_by_sku(sku).await
    }

    async fn create_product(&self, fields: &ProductFields) -> Result<ProductId, StoreError> {
        if fields.title == self.trigger {
            match self.fault {
                Fault::Error => return Err(StoreError::Database("disk I/O error".to_string())),
                Fault::Panic => panic!("store invariant broken"),
            }
        }
        self.inner.create_product(fields).await
    }

    async fn update_product(&self, id: ProductId, fields: &ProductFields) -> Result<(), StoreError> {
        self.inner.update_product(id, fields).await
    }

    async fn find_or_create_category(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
    ) -> Result<CategoryId, StoreError> {
        self.inner.find_or_create_category(name, parent_id).await
    }

    async fn replace_attributes(&self, product_id: ProductId, attributes: &[Param]) -> Result<(), StoreError> {
        self.inner.replace_attributes(product_id, attributes).await
    }

    async fn replace_images(&self, product_id: ProductId, urls: &[String]) -> Result<(), StoreError> {
        self.inner.replace_images(product_id, urls).await
    }

    async fn products_for_feed(&self, feed_id: FeedId) -> Result<Vec<ProductDocument>, StoreError> {
        self.inner.products_for_feed(feed_id).await
    }

    async fn count_products(&self) -> Result<u64, StoreError> {
        self.inner.count_products().await
    }

    async fn count_categories(&self) -> Result<u64, StoreError> {
        self.inner.count_categories().await
    }
}

#[async_trait]
impl FeedStore for FaultyStore {
    async fn create_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError> {
        self.inner.create_feed(feed).await
    }

    async fn get_feed(&self, id: FeedId) -> Result<Option<FeedDefinition>, StoreError> {
        self.inner.get_feed(id).await
    }

    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, StoreError> {
        self.inner.list_feeds().await
    }

    async fn update_feed(&self, feed: &FeedDefinition) -> Result<(), StoreError> {
        self.inner.update_feed(feed).await
    }

    async fn delete_feed(&self, id: FeedId) -> Result<bool, StoreError> {
        self.inner.delete_feed(id).await
    }

    async fn mark_feed_started(&self, id: FeedId) -> Result<(), StoreError> {
        self.inner.mark_feed_started(id).await
    }

    async fn record_feed_run_result(
        &self,
        id: FeedId,
        status: &str,
        product_count: Option<u64>,
    ) -> Result<(), StoreError> {
        self.inner.record_feed_run_result(id, status, product_count).await
    }
}

const SHOP_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SHOP>
  <SHOPITEM>
    <PRODUCTNAME>Trail Shoe</PRODUCTNAME>
    <EAN>8590000000011</EAN>
    <PRICE_VAT>89,90</PRICE_VAT>
    <CATEGORYTEXT>Sport | Running | Shoes</CATEGORYTEXT>
    <IMGURL>https://cdn.example.com/shoe.jpg</IMGURL>
    <PARAM><PARAM_NAME>Size</PARAM_NAME><VAL>42</VAL></PARAM>
  </SHOPITEM>
  <SHOPITEM>
    <PRODUCTNAME>Running Sock</PRODUCTNAME>
    <EAN>8590000000028</EAN>
    <PRICE_VAT>7.50</PRICE_VAT>
    <CATEGORYTEXT>Sport | Running | Socks</CATEGORYTEXT>
  </SHOPITEM>
  <SHOPITEM>
    <PRODUCTNAME>Water Bottle</PRODUCTNAME>
    <ITEM_ID>BTL-1</ITEM_ID>
    <PRICE_VAT>12</PRICE_VAT>
    <CATEGORYTEXT>Sport | Running</CATEGORYTEXT>
  </SHOPITEM>
</SHOP>"#;

async fn registered_feed<S: FeedStore + ?Sized>(store: &S, url: &str) -> FeedDefinition {
    let feed = FeedDefinition::new("shop", url);
    store.create_feed(&feed).await.unwrap();
    feed
}

fn coordinator(store: Arc<dyn Store>, payload: impl Into<Vec<u8>>) -> ImportCoordinator {
    ImportCoordinatorBuilder::new(store, Arc::new(StaticDownloader(payload.into())))
        .with_workers(4)
        .build()
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let feed = registered_feed(store.as_ref(), "https://shop.example.com/feed.xml").await;
    let coordinator = coordinator(store.clone(), SHOP_FEED);

    let first = coordinator
        .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(first.created, 3);
    assert_eq!(first.updated, 0);

    let products = store.count_products().await.unwrap();
    let categories = store.count_categories().await.unwrap();
    assert_eq!(products, 3);
    // Sport > Running > {Shoes, Socks}
    assert_eq!(categories, 4);

    let second = coordinator
        .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 3);
    assert_eq!(store.count_products().await.unwrap(), products);
    assert_eq!(store.count_categories().await.unwrap(), categories);

    let stored = store.get_feed(feed.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status.as_deref(), Some("completed"));
    assert_eq!(stored.product_count, 3);
}

#[tokio::test]
async fn test_category_chain_shared_across_products() {
    let store = Arc::new(MemoryStore::new());
    let feed = registered_feed(store.as_ref(), "https://shop.example.com/feed.xml").await;
    coordinator(store.clone(), SHOP_FEED)
        .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
        .await
        .unwrap();

    let categories = store.categories();
    let sport = categories.iter().find(|c| c.name == "Sport").unwrap();
    let running = categories.iter().find(|c| c.name == "Running").unwrap();
    let shoes = categories.iter().find(|c| c.name == "Shoes").unwrap();
    assert_eq!(sport.parent_id, None);
    assert_eq!(running.parent_id, Some(sport.id));
    assert_eq!(shoes.parent_id, Some(running.id));
    assert_eq!(shoes.slug, "shoes");

    let bottle = store
        .products()
        .into_iter()
        .find(|p| p.fields.title == "Water Bottle")
        .unwrap();
    assert_eq!(bottle.fields.category_id, Some(running.id));
}

#[tokio::test]
async fn test_failing_record_does_not_stop_run() {
    let payload = "title,price,sku\nOne,1,S1\nBroken,2,S2\nThree,3,S3\nFour,4,S4\nFive,5,S5\n";
    let store = Arc::new(FaultyStore::new("Broken", Fault::Error));
    let feed = registered_feed(store.as_ref(), "https://shop.example.com/feed.csv").await;
    let coordinator = coordinator(store.clone(), payload);

    let summary = coordinator
        .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.created, 4);
    assert_eq!(summary.errors, 1);

    let state = coordinator.progress().snapshot(feed.id);
    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.logs.iter().any(|line| line.contains("record #2 failed")));
    assert_eq!(store.count_products().await.unwrap(), 4);
}

#[tokio::test]
async fn test_panicking_run_is_marked_failed() {
    let payload = "title,price,sku\nOne,1,S1\nBoom,2,S2\n";
    let store = Arc::new(FaultyStore::new("Boom", Fault::Panic));
    let feed = registered_feed(store.as_ref(), "https://shop.example.com/feed.csv").await;

    let coordinator = Arc::new(coordinator(store.clone(), payload));
    let manager = RunManager::new(coordinator.clone(), ServiceMetrics::shared());
    manager.start(feed.clone()).unwrap();

    let mut state = coordinator.progress().snapshot(feed.id);
    for _ in 0..200 {
        state = coordinator.progress().snapshot(feed.id);
        if state.status.is_terminal() && !manager.is_running(feed.id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.message.starts_with("internal error"), "{}", state.message);
    assert!(!manager.is_running(feed.id));

    let stored = store.get_feed(feed.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status.as_deref(), Some("failed"));
}

#[tokio::test]
async fn test_preview_of_large_feed() {
    let mut payload = String::from("<SHOP>");
    for i in 0..10_000 {
        payload.push_str(&format!(
            "<SHOPITEM><PRODUCTNAME>Item {}</PRODUCTNAME><PRICE>{}</PRICE></SHOPITEM>",
            i,
            i + 1
        ));
    }
    payload.push_str("</SHOP>");

    let coordinator = coordinator(Arc::new(MemoryStore::new()), payload);
    let preview = coordinator
        .preview(&PreviewRequest {
            url: "https://shop.example.com/big.xml".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(preview.detected_type, FeedFormat::Xml);
    assert_eq!(preview.total_items, 10_000);
    assert_eq!(preview.sample.len(), 5);
    assert_eq!(preview.fields, vec!["PRICE", "PRODUCTNAME"]);
    assert!(!preview.truncated);
}

#[tokio::test]
async fn test_import_into_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let feed = registered_feed(store.as_ref(), "https://shop.example.com/feed.xml").await;
    let coordinator = coordinator(store.clone(), SHOP_FEED);

    let first = coordinator
        .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(first.created, 3);

    let second = coordinator
        .run(&feed, Uuid::new_v4(), &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(second.updated, 3);
    assert_eq!(store.count_products().await.unwrap(), 3);
    assert_eq!(store.count_categories().await.unwrap(), 4);

    let shoe = store.find_product_by_ean("8590000000011").await.unwrap();
    assert!(shoe.is_some());

    let documents = store.products_for_feed(feed.id).await.unwrap();
    assert_eq!(documents.len(), 3);
}
