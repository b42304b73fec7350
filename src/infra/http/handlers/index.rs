use axum::Json;
use serde_json::{Value, json};

use crate::domain::ReportKind;

/// `GET /api`: a human-oriented listing of everything the service exposes.
pub async fn index() -> Json<Value> {
    let reports: Vec<String> = ReportKind::ALL
        .into_iter()
        .map(|kind| format!("/api/{}", kind.endpoint()))
        .collect();

    Json(json!({
        "service": "insumo",
        "reports": reports,
        "operations": [
            "/api/health",
            "/api/health/check",
            "/api/batch",
            "/api/preload",
            "/api/cache/stats",
            "/api/cache/info",
            "/api/cache",
            "/api/alert-recipients",
            "/api/alerts/dispatch",
        ],
    }))
}
