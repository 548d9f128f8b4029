//! API key check for protected routes.
//!
//! A key is accepted from the `X-API-Key` header or, failing that, the
//! `api_key` query parameter. When no keys are configured the check is off.

use axum::{
    extract::{Query, Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameter carrying the API key
pub const API_KEY_QUERY: &str = "api_key";

/// Parse a comma-separated key list; blank entries are ignored and an empty
/// list disables the check
pub fn parse_api_keys(list: &str) -> Option<HashSet<String>> {
    let keys: HashSet<String> = list
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    (!keys.is_empty()).then_some(keys)
}

/// Middleware rejecting requests without a configured API key (403)
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(keys) = &state.config.api_keys else {
        return Ok(next.run(request).await);
    };

    match presented_key(&request) {
        Some(key) if keys.contains(&key) => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected unknown API key");
            Err(ApiError::forbidden("invalid API key"))
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request without API key");
            Err(ApiError::forbidden("missing API key"))
        }
    }
}

fn presented_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| query_key(request.uri()))
}

fn query_key(uri: &Uri) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.get(API_KEY_QUERY).filter(|v| !v.is_empty()).cloned()
}
