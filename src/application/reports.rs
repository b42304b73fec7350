//! Cached report pipeline.
//!
//! `fetch` is the single read path: derive the cache key, serve a live entry
//! when one exists, otherwise coalesce concurrent misses into one warehouse
//! execution, normalize the rows, and store the payload under the report's
//! TTL tier.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::histogram;
use serde_json::{Value, json};
use tracing::debug;

use crate::application::repos::WarehouseGateway;
use crate::cache::{CacheConfig, FlightGroup, TtlStore, derive_key};
use crate::domain::{ReportFilter, ReportKind, SortOrder};
use crate::infra::error::InfraError;

/// Whether a payload was served from the store or recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn header_value(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "HIT",
            CacheOutcome::Miss => "MISS",
        }
    }
}

pub struct ReportService {
    gateway: Arc<dyn WarehouseGateway>,
    cache: Arc<TtlStore>,
    flights: FlightGroup<Value>,
    ttls: CacheConfig,
}

impl ReportService {
    pub fn new(gateway: Arc<dyn WarehouseGateway>, cache: Arc<TtlStore>, ttls: CacheConfig) -> Self {
        Self {
            gateway,
            cache,
            flights: FlightGroup::new(),
            ttls,
        }
    }

    pub fn cache(&self) -> &TtlStore {
        &self.cache
    }

    /// Fetch one report, serving from cache when possible.
    pub async fn fetch(
        &self,
        kind: ReportKind,
        filter: ReportFilter,
    ) -> Result<(Value, CacheOutcome), InfraError> {
        // Non-filterable reports ignore any filter so they share one entry.
        let filter = if kind.filterable() {
            filter
        } else {
            ReportFilter::default()
        };

        let params = filter_params(filter);
        let key = derive_key(kind.endpoint(), &params);

        if let Some(payload) = self.cache.get(&key) {
            return Ok((payload, CacheOutcome::Hit));
        }

        let started = std::time::Instant::now();
        let payload = self
            .flights
            .run(&key, || async {
                // A concurrent flight may have landed between the outer probe
                // and entering this one. Peek rather than get: the outer probe
                // already counted this logical miss.
                if let Some(payload) = self.cache.peek(&key) {
                    return Ok::<_, InfraError>(payload);
                }

                let rows = self.gateway.execute(kind, filter).await?;
                let payload = normalize(kind, rows, &params);
                let ttl = self.ttls.ttl_for(kind.ttl_tier());
                self.cache.set(kind.endpoint(), &key, payload.clone(), ttl);
                debug!(endpoint = kind.endpoint(), %key, "report cached");
                Ok(payload)
            })
            .await?;
        histogram!("insumo_report_fetch_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        Ok((payload, CacheOutcome::Miss))
    }

    /// Drop one exact cache entry. Returns whether it existed.
    pub fn invalidate_key(&self, key: &str) -> bool {
        self.cache.invalidate_exact(key)
    }

    /// Drop every entry belonging to one endpoint, filtered variants
    /// included. Returns the number of entries removed.
    pub fn invalidate_endpoint(&self, endpoint: &str) -> usize {
        self.cache.invalidate_query(endpoint)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

fn filter_params(filter: ReportFilter) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    if let Some(code) = filter.material_code {
        params.insert("material_code".to_string(), json!(code));
    }
    params
}

/// Shape raw warehouse rows into the response payload: drop rows missing a
/// required field, apply the report's sort, and wrap with metadata.
fn normalize(kind: ReportKind, rows: Vec<Value>, params: &BTreeMap<String, Value>) -> Value {
    let required = kind.required_fields();
    let mut rows: Vec<Value> = rows
        .into_iter()
        .filter(|row| {
            row.as_object().is_some_and(|fields| {
                required
                    .iter()
                    .all(|field| fields.get(*field).is_some_and(|value| !value.is_null()))
            })
        })
        .collect();

    if let Some((field, order)) = kind.sort_key() {
        rows.sort_by(|a, b| {
            let ordering = compare_fields(a.get(field), b.get(field));
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }

    let mut meta = serde_json::Map::new();
    meta.insert("count".to_string(), json!(rows.len()));
    meta.insert("query".to_string(), json!(kind.endpoint()));
    if !params.is_empty() {
        meta.insert("params".to_string(), json!(params));
    }

    json!({ "data": rows, "meta": meta })
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => match (a.as_str(), b.as_str()) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => Ordering::Equal,
            },
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct CountingGateway {
        calls: AtomicUsize,
        rows: Vec<Value>,
    }

    impl CountingGateway {
        fn returning(rows: Vec<Value>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                rows,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl WarehouseGateway for CountingGateway {
        async fn execute(
            &self,
            _kind: ReportKind,
            _filter: ReportFilter,
        ) -> Result<Vec<Value>, InfraError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.rows.clone())
        }
    }

    fn service(gateway: Arc<CountingGateway>) -> ReportService {
        ReportService::new(gateway, Arc::new(TtlStore::new()), CacheConfig::default())
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let gateway = Arc::new(CountingGateway::returning(vec![json!({
            "material_code": 10, "material": "Solvent"
        })]));
        let service = service(gateway.clone());

        let (first, outcome) = service
            .fetch(ReportKind::Materials, ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);

        let (second, outcome) = service
            .fetch(ReportKind::Materials, ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(first, second);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn logical_miss_increments_the_miss_counter_once() {
        let gateway = Arc::new(CountingGateway::returning(vec![json!({
            "material_code": 3, "material": "Coolant"
        })]));
        let service = service(gateway);

        service
            .fetch(ReportKind::Materials, ReportFilter::default())
            .await
            .unwrap();
        service
            .fetch(ReportKind::Materials, ReportFilter::default())
            .await
            .unwrap();

        let stats = service.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.hit_rate, "50.00%");
    }

    #[tokio::test]
    async fn filtered_and_unfiltered_variants_cache_separately() {
        let gateway = Arc::new(CountingGateway::returning(vec![json!({
            "month_ref": "2026-01", "monthly_consumption": 5
        })]));
        let service = service(gateway.clone());

        service
            .fetch(ReportKind::MonthlyConsumptionHistory, ReportFilter::default())
            .await
            .unwrap();
        service
            .fetch(
                ReportKind::MonthlyConsumptionHistory,
                ReportFilter::by_material(42),
            )
            .await
            .unwrap();

        assert_eq!(gateway.calls(), 2);
        assert_eq!(service.cache().len(), 2);
    }

    #[tokio::test]
    async fn non_filterable_reports_ignore_the_filter() {
        let gateway = Arc::new(CountingGateway::returning(vec![json!({
            "material": "Grease", "growth_pct": 150.0
        })]));
        let service = service(gateway.clone());

        service
            .fetch(ReportKind::AbruptGrowth, ReportFilter::by_material(42))
            .await
            .unwrap();
        let (_, outcome) = service
            .fetch(ReportKind::AbruptGrowth, ReportFilter::default())
            .await
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn normalization_drops_incomplete_rows_and_sorts() {
        let gateway = Arc::new(CountingGateway::returning(vec![
            json!({"material": "B", "monthly_average": 10.0}),
            json!({"material": "A", "monthly_average": null}),
            json!({"material": "C", "monthly_average": 30.0}),
            json!({"monthly_average": 99.0}),
        ]));
        let service = service(gateway);

        let (payload, _) = service
            .fetch(ReportKind::CriticalMaterials, ReportFilter::default())
            .await
            .unwrap();

        let data = payload["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["material"], "C");
        assert_eq!(data[1]["material"], "B");
        assert_eq!(payload["meta"]["count"], 2);
        assert_eq!(payload["meta"]["query"], "critical-materials");
        assert!(payload["meta"].get("params").is_none());
    }

    #[tokio::test]
    async fn filtered_payload_carries_params_in_meta() {
        let gateway = Arc::new(CountingGateway::returning(vec![json!({
            "six_month_average": 12.5
        })]));
        let service = service(gateway);

        let (payload, _) = service
            .fetch(ReportKind::SixMonthAverage, ReportFilter::by_material(77))
            .await
            .unwrap();

        assert_eq!(payload["meta"]["params"]["material_code"], 77);
    }

    #[tokio::test]
    async fn endpoint_invalidation_forces_recompute() {
        let gateway = Arc::new(CountingGateway::returning(vec![json!({
            "material_code": 1, "material": "Oil"
        })]));
        let service = service(gateway.clone());

        service
            .fetch(ReportKind::Materials, ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(service.invalidate_endpoint("materials"), 1);

        let (_, outcome) = service
            .fetch(ReportKind::Materials, ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
        assert_eq!(gateway.calls(), 2);
    }
}
