//! Feed downloader
//!
//! Feeds are fetched whole for imports and up to a byte cap for previews.
//! A URL that is an absolute filesystem path (or a `file://` URL) is read
//! from local disk instead, but only when `fetch.allow_local_files` is set.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;

/// Errors that can occur while downloading a feed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(reqwest::StatusCode),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// Downloaded payload
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// The byte cap stopped the read before the end of the source
    pub truncated: bool,
}

/// Source of raw feed bytes
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the whole payload
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetch at most `max_bytes`
    async fn fetch_limited(&self, url: &str, max_bytes: u64) -> Result<Payload, FetchError>;
}

/// Where a feed URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Remote(Url),
    Local(PathBuf),
}

impl FeedLocation {
    pub fn is_local(&self) -> bool {
        matches!(self, FeedLocation::Local(_))
    }

    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let raw = raw.trim();
        if raw.starts_with('/') {
            return Ok(FeedLocation::Local(PathBuf::from(raw)));
        }

        let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(FeedLocation::Remote(url)),
            "file" => url
                .to_file_path()
                .map(FeedLocation::Local)
                .map_err(|_| FetchError::InvalidUrl(raw.to_string())),
            other => Err(FetchError::InvalidUrl(format!("unsupported scheme: {}", other))),
        }
    }
}

/// Downloader over reqwest with local file support
pub struct HttpDownloader {
    client: reqwest::Client,
    timeout: Duration,
    allow_local_files: bool,
}

impl HttpDownloader {
    /// Create a downloader with the given overall timeout
    pub fn new(config: &FetchConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            timeout,
            allow_local_files: config.allow_local_files,
        })
    }

    fn locate(&self, url: &str) -> Result<FeedLocation, FetchError> {
        let location = FeedLocation::parse(url)?;
        if location.is_local() && !self.allow_local_files {
            return Err(FetchError::InvalidUrl(format!("local files are not allowed: {}", url)));
        }
        Ok(location)
    }

    async fn read_file(path: &Path, max_bytes: Option<u64>) -> Result<Payload, FetchError> {
        let map_err = |source| FetchError::File {
            path: path.display().to_string(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(map_err)?;

        let mut bytes = Vec::new();
        match max_bytes {
            Some(max) => {
                // Read one byte past the cap to learn whether anything was cut
                file.take(max + 1).read_to_end(&mut bytes).await.map_err(map_err)?;
                let truncated = bytes.len() as u64 > max;
                bytes.truncate(max as usize);
                Ok(Payload { bytes, truncated })
            }
            None => {
                let mut file = file;
                file.read_to_end(&mut bytes).await.map_err(map_err)?;
                Ok(Payload {
                    bytes,
                    truncated: false,
                })
            }
        }
    }

    async fn get(&self, url: &Url, max_bytes: Option<u64>) -> Result<Payload, FetchError> {
        let response = self.client.get(url.as_str()).send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0).min(64 << 20) as usize);
        let mut stream = response.bytes_stream();
        let mut truncated = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(e))?;
            match max_bytes {
                Some(max) if bytes.len() as u64 + chunk.len() as u64 > max => {
                    let room = (max as usize).saturating_sub(bytes.len());
                    bytes.extend_from_slice(&chunk[..room]);
                    truncated = true;
                    break;
                }
                _ => bytes.extend_from_slice(&chunk),
            }
        }

        debug!("Downloaded {} bytes from {} (truncated: {})", bytes.len(), url, truncated);
        Ok(Payload { bytes, truncated })
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(e)
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let payload = match self.locate(url)? {
            FeedLocation::Local(path) => Self::read_file(&path, None).await?,
            FeedLocation::Remote(url) => self.get(&url, None).await?,
        };
        Ok(payload.bytes)
    }

    async fn fetch_limited(&self, url: &str, max_bytes: u64) -> Result<Payload, FetchError> {
        match self.locate(url)? {
            FeedLocation::Local(path) => Self::read_file(&path, Some(max_bytes)).await,
            FeedLocation::Remote(url) => self.get(&url, Some(max_bytes)).await,
        }
    }
}
