//! HTTP API Route Definitions
//!
//! Defines the REST API routes for feedsync.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};

use super::auth::{auth_middleware, AuthState};
use super::handlers::{self, AppState};
use crate::daemon::metrics::{ServiceMetrics, Timer};

/// Create the API router with all routes
pub fn create_router(app_state: AppState, auth_state: AuthState) -> Router {
    let metrics = app_state.metrics.clone();

    // Health check (no auth required)
    let open = Router::new().route("/health", get(handlers::health));

    // Protected routes
    let protected = Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/stats", get(handlers::stats))
        .route("/feeds", get(handlers::list_feeds).post(handlers::create_feed))
        .route("/feeds/preview", post(handlers::preview_feed))
        .route(
            "/feeds/:feed_id",
            get(handlers::get_feed)
                .put(handlers::update_feed)
                .delete(handlers::delete_feed),
        )
        .route("/feeds/:feed_id/import", post(handlers::start_import))
        .route("/feeds/:feed_id/progress", get(handlers::get_progress))
        .route("/feeds/:feed_id/cancel", post(handlers::cancel_import))
        .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    let api_v1 = open
        .merge(protected)
        .layer(middleware::from_fn_with_state(metrics, track_requests))
        .with_state(app_state);

    // Mount under /api/v1
    Router::new().nest("/api/v1", api_v1)
}

/// Count requests and record their latency
async fn track_requests(
    State(metrics): State<Arc<ServiceMetrics>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let timer = Timer::start();
    let response = next.run(request).await;
    metrics.http_requests_total.inc();
    timer.record(&metrics.http_request_latency);
    response
}
