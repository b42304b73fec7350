use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::domain::{ReportFilter, ReportKind};
use crate::infra::http::ApiState;
use crate::infra::http::error::ApiError;

#[derive(Deserialize)]
pub struct ReportQuery {
    pub material_code: Option<String>,
}

/// `GET /api/{endpoint}`. The `X-Cache` header tells the caller whether the
/// payload came from the store.
pub async fn report(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let Some(kind) = ReportKind::from_endpoint(&endpoint) else {
        return Err(ApiError::not_found("Unknown report endpoint"));
    };

    let filter = ReportFilter {
        material_code: query
            .material_code
            .as_deref()
            .and_then(ReportFilter::parse_material_code),
    };

    let (payload, outcome) = state.reports.fetch(kind, filter).await?;

    let mut response = Json(payload).into_response();
    response.headers_mut().insert(
        "x-cache",
        HeaderValue::from_static(outcome.header_value()),
    );
    Ok(response)
}
