//! Vector store endpoints.
//!
//! Documents are embedded with a registered model's `embed` capability and
//! kept in an in-memory, namespaced store.

use axum::{extract::State, Json};
use infergate_core::{DispatchError, VectorItem};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::metrics::RequestTimer;
use crate::state::AppState;
use crate::types::{QueryRequest, QueryResponse, UpsertRequest, UpsertResponse};

/// Embed and store documents
///
/// POST /v1/vec/upsert
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let timer = RequestTimer::new("vec_upsert");
    info!(
        model = %request.model,
        namespace = %request.namespace,
        items = request.items.len(),
        "Handling POST /v1/vec/upsert"
    );

    let result: Result<Json<UpsertResponse>, ApiError> = async {
        if request.items.is_empty() {
            return Err(ApiError::invalid("items must not be empty"));
        }

        // Items without usable text are skipped
        let valid: Vec<_> = request
            .items
            .into_iter()
            .filter_map(|item| {
                let text = item.text.as_deref().map(str::trim).unwrap_or("").to_string();
                (!text.is_empty()).then_some((item, text))
            })
            .collect();

        if valid.is_empty() {
            return Err(ApiError::invalid("no item has non-blank text"));
        }

        let texts: Vec<String> = valid.iter().map(|(_, text)| text.clone()).collect();
        let vectors = state.dispatcher.embed(&request.model, &texts).await?;

        let items = valid
            .into_iter()
            .zip(vectors)
            .map(|((item, text), vector)| VectorItem {
                id: item.id,
                text,
                vector,
                metadata: item.metadata,
            })
            .collect();

        let summary = state.vectors.lock().await.upsert(&request.namespace, items);

        Ok(Json(UpsertResponse {
            namespace: request.namespace,
            added: summary.added,
            updated: summary.updated,
            size: summary.size,
        }))
    }
    .await;

    timer.record(&result);
    result
}

/// Nearest-neighbour search over a namespace
///
/// POST /v1/vec/query
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let timer = RequestTimer::new("vec_query");
    info!(
        model = %request.model,
        namespace = %request.namespace,
        top_k = request.top_k,
        "Handling POST /v1/vec/query"
    );

    let result: Result<Json<QueryResponse>, ApiError> = async {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ApiError::invalid("query must not be blank"));
        }

        // Nothing to compare against, so skip the embedding call
        if state.vectors.lock().await.is_empty(&request.namespace) {
            return Ok(Json(QueryResponse {
                namespace: request.namespace,
                query,
                top_k: request.top_k,
                matches: Vec::new(),
            }));
        }

        let mut vectors = state
            .dispatcher
            .embed(&request.model, std::slice::from_ref(&query))
            .await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| DispatchError::adapter("adapter returned no vector"))?;

        let matches = state
            .vectors
            .lock()
            .await
            .query(&request.namespace, &vector, request.top_k);

        Ok(Json(QueryResponse {
            namespace: request.namespace,
            query,
            top_k: request.top_k,
            matches,
        }))
    }
    .await;

    timer.record(&result);
    result
}
