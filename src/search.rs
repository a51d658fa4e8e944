//! Search index synchronisation
//!
//! After a completed run the feed's products are pushed to an
//! Elasticsearch-compatible index. The index is optional: when it is
//! absent or failing, the import result is unaffected.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::types::ProductDocument;

/// Errors from the search backend
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search backend returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("bulk request reported {0} failed items")]
    BulkFailures(usize),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Document sink for catalog search
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index or replace the given documents
    async fn bulk_upsert(&self, documents: &[ProductDocument]) -> Result<(), SearchError>;

    /// Make recent writes visible to searches
    async fn refresh(&self) -> Result<(), SearchError>;
}

/// Documents sent per `_bulk` request
const BULK_CHUNK: usize = 500;

/// Elasticsearch / OpenSearch client over the REST API
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl ElasticsearchIndex {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    /// Build the newline-delimited `_bulk` body for a batch
    fn bulk_body(&self, documents: &[ProductDocument]) -> Result<String, SearchError> {
        let mut body = String::new();
        for doc in documents {
            let action = serde_json::json!({ "index": { "_index": self.index, "_id": doc.id.to_string() } });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(doc)?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SearchError::Status { status, body })
        }
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn bulk_upsert(&self, documents: &[ProductDocument]) -> Result<(), SearchError> {
        let url = format!("{}/_bulk", self.base_url);

        for chunk in documents.chunks(BULK_CHUNK) {
            let response = self
                .client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(self.bulk_body(chunk)?)
                .send()
                .await?;
            let response: BulkResponse = Self::check(response).await?.json().await?;

            if response.errors {
                let failed = response
                    .items
                    .iter()
                    .filter(|item| item.pointer("/index/error").is_some())
                    .count();
                return Err(SearchError::BulkFailures(failed));
            }
            debug!("Indexed {} documents into {}", chunk.len(), self.index);
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<(), SearchError> {
        let url = format!("{}/{}/_refresh", self.base_url, self.index);
        let response = self.client.post(&url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Push documents and refresh, logging instead of failing
pub async fn sync_documents(index: &dyn SearchIndex, documents: &[ProductDocument]) -> bool {
    if documents.is_empty() {
        return true;
    }
    if let Err(e) = index.bulk_upsert(documents).await {
        warn!("Search index bulk upsert failed: {}", e);
        return false;
    }
    if let Err(e) = index.refresh().await {
        warn!("Search index refresh failed: {}", e);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn doc(title: &str) -> ProductDocument {
        ProductDocument {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: title.to_lowercase(),
            description: String::new(),
            ean: String::new(),
            sku: String::new(),
            brand: String::new(),
            image_url: String::new(),
            affiliate_url: String::new(),
            category_id: None,
            price: 1.0,
            feed_id: None,
        }
    }

    #[test]
    fn test_bulk_body_is_ndjson() {
        let index = ElasticsearchIndex::new(&SearchConfig::default()).unwrap();
        let docs = vec![doc("A"), doc("B")];
        let body = index.bulk_body(&docs).unwrap();

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));

        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "products");
        assert_eq!(action["index"]["_id"], docs[0].id.to_string());
        let source: serde_json::Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(source["title"], "B");
    }

    #[tokio::test]
    async fn test_unreachable_index_is_not_fatal() {
        let config = SearchConfig {
            enabled: true,
            url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let index = ElasticsearchIndex::new(&config).unwrap();
        assert!(!sync_documents(&index, &[doc("A")]).await);
        assert!(sync_documents(&index, &[]).await);
    }
}
