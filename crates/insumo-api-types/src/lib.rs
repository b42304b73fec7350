//! Shared wire types for the insumo consumption-monitoring API.
//!
//! Both the server and the command-line client serialize these shapes, so the
//! JSON contract lives in one place. Report rows themselves stay opaque
//! (`serde_json::Value`): the warehouse decides the columns, the transport
//! does not.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Envelope returned by every report endpoint: normalized rows plus metadata
/// about the query that produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportPayload {
    pub data: Vec<Value>,
    pub meta: ReportMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportMeta {
    pub count: usize,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Body of `POST /api/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub requests: Vec<BatchItemSpec>,
}

/// One named sub-request inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemSpec {
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

/// Per-item outcome inside a batch response. Exactly one of `data` / `error`
/// is present depending on `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub endpoint: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Envelope of `POST /api/batch`. Always reported with HTTP 200 once the
/// batch mechanism itself ran; item failures live inside `results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub count: usize,
    pub results: BTreeMap<String, BatchItemResult>,
    pub timestamp: String,
}

/// Envelope of `GET /api/preload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadResponse {
    pub success: bool,
    pub preloaded: usize,
    pub results: BTreeMap<String, BatchItemResult>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub timestamp: String,
}

/// Cache counters exposed at `GET /api/cache/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsBody {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_rate: String,
    pub size: usize,
    pub total_requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfoBody {
    pub size: usize,
    pub stats: CacheStatsBody,
    pub keys: Vec<String>,
}

/// A registered alert recipient. Rows are soft-deleted by flipping `active`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RecipientRecord {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecipientRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRecipientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientListResponse {
    pub data: Vec<RecipientRecord>,
    pub meta: ListMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMeta {
    pub count: usize,
}

/// Outcome of a growth-alert dispatch run, manual or scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub ok: bool,
    pub sent: u32,
    pub failed: u32,
    pub errors: Vec<DispatchError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchError {
    pub email: String,
    pub message: String,
}

/// JSON error body produced by the API for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}
