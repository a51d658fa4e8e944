//! API key authentication
//!
//! Keys come from `[http].api_keys`. With no keys configured every request
//! passes; otherwise the key is read from `Authorization: Bearer <key>`
//! (a bare key is accepted too) or from `X-API-Key`.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use super::types::ErrorResponse;

const API_KEY_HEADER: &str = "x-api-key";

/// Shared state for authentication
#[derive(Clone)]
pub struct AuthState {
    /// Valid API keys (empty means no auth required)
    pub api_keys: Arc<Vec<String>>,
}

impl AuthState {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            api_keys: Arc::new(api_keys.into_iter().filter(|k| !k.trim().is_empty()).collect()),
        }
    }

    pub fn auth_required(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn validate_key(&self, key: &str) -> bool {
        if self.api_keys.is_empty() {
            return true;
        }
        self.api_keys.iter().any(|k| k == key)
    }
}

/// Key presented by the client, if any
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        return Some(value.strip_prefix("Bearer ").unwrap_or(value).trim());
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
}

/// Authentication middleware
pub async fn auth_middleware(State(auth): State<AuthState>, request: Request<Body>, next: Next) -> Response {
    if !auth.auth_required() {
        return next.run(request).await;
    }

    match presented_key(request.headers()) {
        Some(key) if auth.validate_key(key) => next.run(request).await,
        _ => {
            debug!("Rejected unauthenticated request to {}", request.uri().path());
            (StatusCode::UNAUTHORIZED, Json(ErrorResponse::unauthorized())).into_response()
        }
    }
}
