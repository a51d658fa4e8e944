//! HTTP API Request Handlers

mod feeds;
mod system;

use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::types::ErrorResponse;
use crate::daemon::jobs::RunManager;
use crate::daemon::metrics::ServiceMetrics;
use crate::fetch::FeedLocation;
use crate::import::ImportCoordinator;
use crate::store::{Store, StoreError};
use crate::types::FeedId;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub coordinator: Arc<ImportCoordinator>,
    pub runs: Arc<RunManager>,
    pub metrics: Arc<ServiceMetrics>,
    /// Whether feed URLs may point at the server's filesystem
    pub allow_local_files: bool,
}

impl AppState {
    /// State for a run manager, sharing its coordinator and store
    pub fn new(runs: Arc<RunManager>, metrics: Arc<ServiceMetrics>) -> Self {
        let coordinator = runs.coordinator().clone();
        Self {
            store: coordinator.store().clone(),
            coordinator,
            runs,
            metrics,
            allow_local_files: false,
        }
    }

    pub fn with_local_files(mut self, allow: bool) -> Self {
        self.allow_local_files = allow;
        self
    }
}

// Re-export all handlers
pub use feeds::{
    cancel_import, create_feed, delete_feed, get_feed, get_progress, list_feeds, preview_feed,
    start_import, update_feed,
};
pub use system::{health, prometheus_metrics, stats};

/// Parse a feed ID path segment, returning an error response on failure
fn parse_feed_id(raw: &str) -> Result<FeedId, Response> {
    uuid::Uuid::parse_str(raw).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("INVALID_FEED_ID", "Invalid feed ID format")),
        )
            .into_response()
    })
}

fn store_error(e: StoreError) -> Response {
    error!("Store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal_error(e.to_string())),
    )
        .into_response()
}

fn feed_not_found(id: FeedId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::not_found(format!("Feed {} not found", id))),
    )
        .into_response()
}

/// Unwrap a JSON body, turning extractor rejections into a 400 `{code, message}`
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(body)| body).map_err(|rejection| bad_request(rejection.body_text()))
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::bad_request(message))).into_response()
}

/// Refuse filesystem locations unless the service allows them
fn check_location(state: &AppState, url: &str) -> Result<(), Response> {
    match FeedLocation::parse(url) {
        Ok(location) if location.is_local() && !state.allow_local_files => {
            Err(bad_request(format!("local file feeds are disabled: {}", url)))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(bad_request(e.to_string())),
    }
}
