use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use insumo_api_types::{
    CreateRecipientRequest, DispatchSummary, ListMeta, RecipientListResponse, RecipientRecord,
    UpdateRecipientRequest,
};

use crate::infra::http::ApiState;
use crate::infra::http::error::ApiError;

pub async fn list_recipients(
    State(state): State<ApiState>,
) -> Result<Json<RecipientListResponse>, ApiError> {
    let data = state.alerts.list().await?;
    let meta = ListMeta { count: data.len() };
    Ok(Json(RecipientListResponse { data, meta }))
}

pub async fn create_recipient(
    State(state): State<ApiState>,
    Json(request): Json<CreateRecipientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.alerts.create(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_recipient(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateRecipientRequest>,
) -> Result<Json<RecipientRecord>, ApiError> {
    let record = state.alerts.update(id, request).await?;
    Ok(Json(record))
}

pub async fn delete_recipient(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.alerts.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/alerts/dispatch`: manual trigger of the growth alert run.
pub async fn dispatch_alerts(
    State(state): State<ApiState>,
) -> Result<Json<DispatchSummary>, ApiError> {
    let summary = state.alerts.dispatch().await?;
    Ok(Json(summary))
}
