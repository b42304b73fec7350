use axum::Json;
use axum::extract::State;

use insumo_api_types::HealthResponse;

use crate::infra::http::ApiState;

use super::rfc3339_now;

/// Shallow liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        database: None,
        timestamp: rfc3339_now(),
    })
}

/// Deep probe that also pings the database.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (status, database) = match state.db.health_check().await {
        Ok(()) => ("ok", "connected"),
        Err(_) => ("degraded", "disconnected"),
    };
    Json(HealthResponse {
        status: status.to_string(),
        database: Some(database.to_string()),
        timestamp: rfc3339_now(),
    })
}
