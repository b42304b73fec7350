use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use insumo_api_types::{CacheInfoBody, CacheStatsBody};

use crate::infra::http::ApiState;
use crate::infra::http::error::ApiError;

pub async fn cache_stats(State(state): State<ApiState>) -> Json<CacheStatsBody> {
    Json(state.reports.cache().stats())
}

pub async fn cache_info(State(state): State<ApiState>) -> Json<CacheInfoBody> {
    Json(state.reports.cache().info())
}

#[derive(Deserialize)]
pub struct CacheClearQuery {
    /// Exact derived key to drop.
    pub key: Option<String>,
    /// Logical endpoint whose entries should all be dropped.
    pub endpoint: Option<String>,
}

/// `DELETE /api/cache`. With `key` drops one entry, with `endpoint` drops
/// every variant of that report, with neither empties the store.
pub async fn cache_clear(
    State(state): State<ApiState>,
    Query(query): Query<CacheClearQuery>,
) -> Result<Json<Value>, ApiError> {
    let deleted = match (query.key, query.endpoint) {
        (Some(_), Some(_)) => {
            return Err(ApiError::bad_request(
                "Pass either key or endpoint, not both",
                None,
            ));
        }
        (Some(key), None) => usize::from(state.reports.invalidate_key(&key)),
        (None, Some(endpoint)) => state.reports.invalidate_endpoint(&endpoint),
        (None, None) => {
            let size = state.reports.cache().len();
            state.reports.clear();
            size
        }
    };

    info!(deleted, "cache invalidation requested");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
