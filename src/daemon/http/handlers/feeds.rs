//! Feed handlers: CRUD, run trigger, progress, cancel, preview

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, info, warn};

use super::{bad_request, check_location, feed_not_found, json_body, parse_feed_id, store_error, AppState};
use crate::daemon::http::types::*;
use crate::daemon::jobs::RunError;
use crate::fetch::FetchError;
use crate::import::ImportError;

/// List all feeds
pub async fn list_feeds(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_feeds().await {
        Ok(feeds) => (StatusCode::OK, Json(FeedListResponse { feeds })).into_response(),
        Err(e) => store_error(e),
    }
}

/// Register a new feed
pub async fn create_feed(
    State(state): State<AppState>,
    payload: Result<Json<CreateFeedRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    let feed = match request.into_feed() {
        Ok(feed) => feed,
        Err(message) => return bad_request(message),
    };
    if let Err(resp) = check_location(&state, &feed.url) {
        return resp;
    }

    match state.store.create_feed(&feed).await {
        Ok(()) => {
            info!("Created feed '{}' ({})", feed.name, feed.id);
            (StatusCode::CREATED, Json(feed)).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// Fetch one feed
pub async fn get_feed(State(state): State<AppState>, Path(feed_id): Path<String>) -> impl IntoResponse {
    let id = match parse_feed_id(&feed_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.get_feed(id).await {
        Ok(Some(feed)) => (StatusCode::OK, Json(feed)).into_response(),
        Ok(None) => feed_not_found(id),
        Err(e) => store_error(e),
    }
}

/// Partially update a feed's configuration
pub async fn update_feed(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    payload: Result<Json<UpdateFeedRequest>, JsonRejection>,
) -> impl IntoResponse {
    let id = match parse_feed_id(&feed_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(resp) => return resp,
    };

    let mut feed = match state.store.get_feed(id).await {
        Ok(Some(feed)) => feed,
        Ok(None) => return feed_not_found(id),
        Err(e) => return store_error(e),
    };

    if let Err(message) = request.apply_to(&mut feed) {
        return bad_request(message);
    }
    if let Err(resp) = check_location(&state, &feed.url) {
        return resp;
    }

    match state.store.update_feed(&feed).await {
        Ok(()) => (StatusCode::OK, Json(feed)).into_response(),
        Err(e) => store_error(e),
    }
}

/// Delete a feed; products it created are kept
pub async fn delete_feed(State(state): State<AppState>, Path(feed_id): Path<String>) -> impl IntoResponse {
    let id = match parse_feed_id(&feed_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if state.runs.is_running(id) {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("RUN_IN_PROGRESS", "Cancel the running import first")),
        )
            .into_response();
    }

    match state.store.delete_feed(id).await {
        Ok(true) => {
            info!("Deleted feed {}", id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => feed_not_found(id),
        Err(e) => store_error(e),
    }
}

/// Trigger an import run; returns as soon as the run is queued
pub async fn start_import(State(state): State<AppState>, Path(feed_id): Path<String>) -> impl IntoResponse {
    let id = match parse_feed_id(&feed_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let feed = match state.store.get_feed(id).await {
        Ok(Some(feed)) => feed,
        Ok(None) => return feed_not_found(id),
        Err(e) => return store_error(e),
    };

    if !feed.active {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("FEED_INACTIVE", format!("Feed {} is not active", id))),
        )
            .into_response();
    }

    match state.runs.start(feed) {
        Ok(run_id) => (
            StatusCode::ACCEPTED,
            Json(RunStartedResponse {
                feed_id: id,
                run_id,
                status: "started".to_string(),
            }),
        )
            .into_response(),
        Err(e @ RunError::AlreadyRunning(_)) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("RUN_IN_PROGRESS", e.to_string())),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal_error(e.to_string())))
            .into_response(),
    }
}

/// Progress of the feed's latest run, `idle` if it never ran
pub async fn get_progress(State(state): State<AppState>, Path(feed_id): Path<String>) -> impl IntoResponse {
    let id = match parse_feed_id(&feed_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    debug!("HTTP progress request: {}", id);
    (StatusCode::OK, Json(state.coordinator.progress().snapshot(id))).into_response()
}

/// Request cancellation of the feed's in-flight run
pub async fn cancel_import(State(state): State<AppState>, Path(feed_id): Path<String>) -> impl IntoResponse {
    let id = match parse_feed_id(&feed_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.runs.cancel(id) {
        Ok(run_id) => (
            StatusCode::ACCEPTED,
            Json(CancelResponse {
                feed_id: id,
                run_id,
                status: "cancelling".to_string(),
            }),
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ErrorResponse::new("NO_ACTIVE_RUN", e.to_string()))).into_response(),
    }
}

/// Describe a feed without importing it
pub async fn preview_feed(
    State(state): State<AppState>,
    payload: Result<Json<PreviewFeedRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match json_body(payload).and_then(|body| body.into_request().map_err(|e| bad_request(e))) {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    if let Err(resp) = check_location(&state, &request.url) {
        return resp;
    }

    debug!("HTTP preview request: {}", request.url);
    match state.coordinator.preview(&request).await {
        Ok(preview) => {
            state.metrics.previews_served.inc();
            (StatusCode::OK, Json(preview)).into_response()
        }
        Err(ImportError::Fetch(FetchError::InvalidUrl(message))) => bad_request(message),
        Err(ImportError::Fetch(e)) => {
            warn!("Preview download of {} failed: {}", request.url, e);
            (StatusCode::BAD_GATEWAY, Json(ErrorResponse::new("FETCH_FAILED", e.to_string()))).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal_error(e.to_string())))
            .into_response(),
    }
}
