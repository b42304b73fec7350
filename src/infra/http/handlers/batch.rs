use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::Value;

use insumo_api_types::{BatchRequest, BatchResponse, PreloadResponse};

use crate::application::batch::MAX_BATCH_ITEMS;
use crate::domain::ReportFilter;
use crate::infra::http::ApiState;
use crate::infra::http::error::ApiError;

use super::rfc3339_now;

/// `POST /api/batch`. Any malformed envelope is a 400, not the extractor's
/// default 422. The envelope is always 200 once the request shape is valid;
/// per-item failures are reported inside `results`.
pub async fn batch(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| {
        ApiError::bad_request("Batch body must be valid JSON", Some(rejection.body_text()))
    })?;
    let request: BatchRequest = serde_json::from_value(body).map_err(|err| {
        ApiError::bad_request(
            "Batch body must be an object with a `requests` array",
            Some(err.to_string()),
        )
    })?;

    if request.requests.is_empty() {
        return Err(ApiError::bad_request(
            "Batch must contain at least one request",
            None,
        ));
    }
    if request.requests.len() > MAX_BATCH_ITEMS {
        return Err(ApiError::bad_request(
            "Batch exceeds the maximum of 10 requests",
            Some(format!("received {}", request.requests.len())),
        ));
    }

    let results = state.batch.execute(request.requests).await;
    Ok(Json(BatchResponse {
        success: true,
        count: results.len(),
        results,
        timestamp: rfc3339_now(),
    }))
}

#[derive(Deserialize)]
pub struct PreloadQuery {
    pub material_code: Option<String>,
}

/// `GET /api/preload`. Warms the dashboard's first-paint reports.
pub async fn preload(
    State(state): State<ApiState>,
    Query(query): Query<PreloadQuery>,
) -> Result<Json<PreloadResponse>, ApiError> {
    let material_code = query
        .material_code
        .as_deref()
        .and_then(ReportFilter::parse_material_code);

    let (preloaded, results) = state.batch.preload(material_code).await;
    Ok(Json(PreloadResponse {
        success: true,
        preloaded,
        results,
        timestamp: rfc3339_now(),
    }))
}
