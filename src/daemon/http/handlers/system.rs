//! System handlers: health, metrics, stats

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::{store_error, AppState};
use crate::daemon::http::types::*;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.to_prometheus();
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Catalog totals plus a metrics snapshot
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let totals = async {
        Ok::<_, crate::store::StoreError>((
            state.store.count_products().await?,
            state.store.count_categories().await?,
            state.store.list_feeds().await?.len() as u64,
        ))
    };

    match totals.await {
        Ok((total_products, total_categories, total_feeds)) => (
            StatusCode::OK,
            Json(StatsResponse {
                total_products,
                total_categories,
                total_feeds,
                active_runs: state.runs.active_count() as u64,
                metrics: state.metrics.snapshot(),
            }),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}
