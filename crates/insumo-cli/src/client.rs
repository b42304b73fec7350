//! HTTP client with the local cache and dispatch queue wired in.
//!
//! Read endpoints go through the local TTL cache and an in-flight registry so
//! identical concurrent reads share one outbound request. Mutations skip the
//! cache but still pass through the dispatch queue; only health probes bypass
//! both.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use insumo_api_types::{
    ApiErrorBody, BatchItemSpec, BatchRequest, BatchResponse, CacheInfoBody, CacheStatsBody,
    CreateRecipientRequest, DispatchSummary, HealthResponse, PreloadResponse,
    RecipientListResponse, RecipientRecord, ReportPayload, UpdateRecipientRequest,
};

use crate::cache::{self, ResponseCache};
use crate::error::CliError;
use crate::queue::RequestQueue;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5001/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BATCH_ITEMS: usize = 10;

/// In-flight read registry: identical concurrent reads share one outbound
/// request. A failed request is not retained, so the next read retries.
#[derive(Default)]
struct Flights {
    cells: Mutex<HashMap<String, Arc<OnceCell<Value>>>>,
}

impl Flights {
    async fn run<F, Fut>(&self, key: &str, compute: F) -> Result<Value, CliError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, CliError>>,
    {
        let cell = {
            let mut cells = match self.cells.lock() {
                Ok(cells) => cells,
                Err(poisoned) => poisoned.into_inner(),
            };
            cells
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell.get_or_try_init(compute).await.cloned();

        let mut cells = match self.cells.lock() {
            Ok(cells) => cells,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = cells.get(key) {
            if Arc::ptr_eq(current, &cell) {
                cells.remove(key);
            }
        }

        result
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    cache: ResponseCache,
    queue: RequestQueue,
    flights: Flights,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self, CliError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            cache: ResponseCache::new(),
            queue: RequestQueue::default(),
            flights: Flights::default(),
        })
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, CliError> {
        Ok(Url::parse(&format!("{}/{}", self.base, path))?)
    }

    /// Fetch a named report, served from the local cache when fresh.
    pub async fn report(
        &self,
        endpoint: &str,
        material_code: Option<i32>,
    ) -> Result<ReportPayload, CliError> {
        let query = material_query(material_code);
        let payload = self.get_cached(endpoint, &query).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Shallow liveness probe. Never queued, never cached.
    pub async fn health(&self) -> Result<HealthResponse, CliError> {
        let url = self.endpoint_url("health")?;
        decode(self.http.get(url).send().await?).await
    }

    /// Deep probe that exercises the service's database connection.
    pub async fn health_check(&self) -> Result<HealthResponse, CliError> {
        let url = self.endpoint_url("health/check")?;
        decode(self.http.get(url).send().await?).await
    }

    pub async fn batch(&self, requests: Vec<BatchItemSpec>) -> Result<BatchResponse, CliError> {
        if requests.is_empty() {
            return Err(CliError::usage("batch needs at least one endpoint"));
        }
        if requests.len() > MAX_BATCH_ITEMS {
            return Err(CliError::usage(format!(
                "batch accepts at most {MAX_BATCH_ITEMS} endpoints"
            )));
        }

        let url = self.endpoint_url("batch")?;
        let _permit = self.queue.acquire().await?;
        let response = self
            .http
            .post(url)
            .json(&BatchRequest { requests })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn preload(&self, material_code: Option<i32>) -> Result<PreloadResponse, CliError> {
        let url = self.endpoint_url("preload")?;
        let query = material_query(material_code);
        let _permit = self.queue.acquire().await?;
        decode(self.http.get(url).query(&query).send().await?).await
    }

    pub async fn list_recipients(&self) -> Result<RecipientListResponse, CliError> {
        let url = self.endpoint_url("alert-recipients")?;
        let _permit = self.queue.acquire().await?;
        decode(self.http.get(url).send().await?).await
    }

    pub async fn create_recipient(
        &self,
        request: CreateRecipientRequest,
    ) -> Result<RecipientRecord, CliError> {
        let url = self.endpoint_url("alert-recipients")?;
        let _permit = self.queue.acquire().await?;
        decode(self.http.post(url).json(&request).send().await?).await
    }

    pub async fn update_recipient(
        &self,
        id: i32,
        request: UpdateRecipientRequest,
    ) -> Result<RecipientRecord, CliError> {
        let url = self.endpoint_url(&format!("alert-recipients/{id}"))?;
        let _permit = self.queue.acquire().await?;
        decode(self.http.put(url).json(&request).send().await?).await
    }

    pub async fn remove_recipient(&self, id: i32) -> Result<(), CliError> {
        let url = self.endpoint_url(&format!("alert-recipients/{id}"))?;
        let _permit = self.queue.acquire().await?;
        let response = self.http.delete(url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn dispatch_alerts(&self) -> Result<DispatchSummary, CliError> {
        let url = self.endpoint_url("alerts/dispatch")?;
        let _permit = self.queue.acquire().await?;
        decode(self.http.post(url).send().await?).await
    }

    pub async fn cache_stats(&self) -> Result<CacheStatsBody, CliError> {
        let url = self.endpoint_url("cache/stats")?;
        let _permit = self.queue.acquire().await?;
        decode(self.http.get(url).send().await?).await
    }

    pub async fn cache_info(&self) -> Result<CacheInfoBody, CliError> {
        let url = self.endpoint_url("cache/info")?;
        let _permit = self.queue.acquire().await?;
        decode(self.http.get(url).send().await?).await
    }

    /// Invalidate server-side cache entries; also drops the local cache so
    /// the next read observes the recomputation.
    pub async fn cache_clear(
        &self,
        key: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Value, CliError> {
        let url = self.endpoint_url("cache")?;
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(key) = key {
            query.push(("key".to_string(), key.to_string()));
        }
        if let Some(endpoint) = endpoint {
            query.push(("endpoint".to_string(), endpoint.to_string()));
        }

        let _permit = self.queue.acquire().await?;
        let cleared: Value = decode(self.http.delete(url).query(&query).send().await?).await?;
        self.cache.clear();
        Ok(cleared)
    }

    async fn get_cached(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, CliError> {
        let key = cache::request_key(path, query);
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        self.flights
            .run(&key, || async {
                // A joined flight may have populated the cache meanwhile.
                if let Some(value) = self.cache.get(&key) {
                    return Ok(value);
                }

                let url = self.endpoint_url(path)?;
                let _permit = self.queue.acquire().await?;
                let value: Value = decode(self.http.get(url).query(query).send().await?).await?;
                self.cache.set(&key, value.clone(), cache::ttl_for(path));
                Ok(value)
            })
            .await
    }
}

fn material_query(material_code: Option<i32>) -> Vec<(String, String)> {
    match material_code {
        Some(code) => vec![("material_code".to_string(), code.to_string())],
        None => Vec::new(),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CliError> {
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

async fn ensure_success(response: Response) -> Result<Response, CliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match response.json::<ApiErrorBody>().await {
        Ok(body) => CliError::Api {
            status: status.as_u16(),
            code: body.error.code,
            message: body.error.message,
            hint: body.error.hint,
        },
        Err(_) => CliError::Api {
            status: status.as_u16(),
            code: "UNKNOWN".to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string(),
            hint: None,
        },
    })
}
