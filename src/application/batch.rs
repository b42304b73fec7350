//! Batch execution and dashboard preload.
//!
//! A batch request carries up to [`MAX_BATCH_ITEMS`] report specs which are
//! dispatched concurrently through the cached pipeline. A failing item never
//! fails the batch; it surfaces as a per-item error in the result map.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use insumo_api_types::{BatchItemResult, BatchItemSpec};

use crate::application::reports::ReportService;
use crate::domain::{ReportFilter, ReportKind};

pub const MAX_BATCH_ITEMS: usize = 10;

/// Reports warmed by the dashboard preload, in dispatch order.
pub const PRELOAD_KINDS: [ReportKind; 4] = [
    ReportKind::MonthlyConsumptionHistory,
    ReportKind::FilteredMonthProjection,
    ReportKind::SixMonthAverage,
    ReportKind::Materials,
];

pub struct BatchService {
    reports: Arc<ReportService>,
}

impl BatchService {
    pub fn new(reports: Arc<ReportService>) -> Self {
        Self { reports }
    }

    /// Dispatch every item concurrently. Results are keyed by endpoint; when
    /// a batch names the same endpoint twice the later item wins.
    pub async fn execute(&self, items: Vec<BatchItemSpec>) -> BTreeMap<String, BatchItemResult> {
        let outcomes = join_all(items.into_iter().map(|item| self.run_item(item))).await;

        let mut results = BTreeMap::new();
        for outcome in outcomes {
            results.insert(outcome.endpoint.clone(), outcome);
        }
        results
    }

    /// Warm the dashboard's first-paint reports. The optional material code
    /// applies to the filterable ones.
    pub async fn preload(
        &self,
        material_code: Option<i32>,
    ) -> (usize, BTreeMap<String, BatchItemResult>) {
        let items = PRELOAD_KINDS
            .into_iter()
            .map(|kind| {
                let mut params = BTreeMap::new();
                if kind.filterable() {
                    if let Some(code) = material_code {
                        params.insert("material_code".to_string(), Value::from(code));
                    }
                }
                BatchItemSpec {
                    endpoint: kind.endpoint().to_string(),
                    params,
                }
            })
            .collect();

        let results = self.execute(items).await;
        let preloaded = results.values().filter(|item| item.success).count();
        debug!(preloaded, "dashboard preload finished");
        (preloaded, results)
    }

    async fn run_item(&self, item: BatchItemSpec) -> BatchItemResult {
        let Some(kind) = ReportKind::from_endpoint(&item.endpoint) else {
            return BatchItemResult {
                endpoint: item.endpoint,
                success: false,
                data: None,
                error: Some("unknown endpoint".to_string()),
            };
        };

        match self.reports.fetch(kind, filter_from_params(&item.params)).await {
            Ok((payload, _)) => BatchItemResult {
                endpoint: item.endpoint,
                success: true,
                data: Some(payload),
                error: None,
            },
            Err(err) => BatchItemResult {
                endpoint: item.endpoint,
                success: false,
                data: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Extract the material filter from loosely typed batch params. Numbers and
/// numeric strings both count; anything else means unfiltered.
pub fn filter_from_params(params: &BTreeMap<String, Value>) -> ReportFilter {
    let material_code = match params.get("material_code") {
        Some(Value::Number(n)) => n.as_i64().and_then(|code| i32::try_from(code).ok()),
        Some(Value::String(raw)) => ReportFilter::parse_material_code(raw),
        _ => None,
    };
    ReportFilter { material_code }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::application::repos::WarehouseGateway;
    use crate::cache::{CacheConfig, TtlStore};
    use crate::infra::error::InfraError;

    struct StubGateway {
        calls: AtomicUsize,
        fail_kind: Option<ReportKind>,
    }

    #[async_trait]
    impl WarehouseGateway for StubGateway {
        async fn execute(
            &self,
            kind: ReportKind,
            _filter: ReportFilter,
        ) -> Result<Vec<Value>, InfraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_kind == Some(kind) {
                return Err(InfraError::database("connection refused"));
            }
            Ok(vec![json!({
                "material_code": 1,
                "material": "Oil",
                "month_ref": "2026-01",
                "monthly_consumption": 2,
                "six_month_average": 3.0,
                "consumption_to_date": 4,
                "projected_month_consumption": 5,
            })])
        }
    }

    fn batch_service(fail_kind: Option<ReportKind>) -> (BatchService, Arc<StubGateway>) {
        let gateway = Arc::new(StubGateway {
            calls: AtomicUsize::new(0),
            fail_kind,
        });
        let reports = Arc::new(ReportService::new(
            gateway.clone(),
            Arc::new(TtlStore::new()),
            CacheConfig::default(),
        ));
        (BatchService::new(reports), gateway)
    }

    fn spec(endpoint: &str) -> BatchItemSpec {
        BatchItemSpec {
            endpoint: endpoint.to_string(),
            params: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn unknown_endpoint_fails_only_its_item() {
        let (service, _) = batch_service(None);

        let results = service
            .execute(vec![spec("materials"), spec("no-such-report")])
            .await;

        assert!(results["materials"].success);
        let failed = &results["no-such-report"];
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("unknown endpoint"));
    }

    #[tokio::test]
    async fn gateway_failure_is_isolated_per_item() {
        let (service, _) = batch_service(Some(ReportKind::MonthlyConsumptionHistory));

        let results = service
            .execute(vec![spec("materials"), spec("monthly-consumption-history")])
            .await;

        assert!(results["materials"].success);
        assert!(!results["monthly-consumption-history"].success);
        assert!(
            results["monthly-consumption-history"]
                .error
                .as_deref()
                .is_some_and(|msg| msg.contains("connection refused"))
        );
    }

    #[tokio::test]
    async fn duplicate_endpoints_collapse_to_one_result() {
        let (service, gateway) = batch_service(None);

        let results = service.execute(vec![spec("materials"), spec("materials")]).await;

        assert_eq!(results.len(), 1);
        assert!(results["materials"].success);
        // Both items derive the same key, so the store is computed once.
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preload_warms_the_dashboard_reports() {
        let (service, _) = batch_service(None);

        let (preloaded, results) = service.preload(Some(42)).await;

        assert_eq!(preloaded, PRELOAD_KINDS.len());
        for kind in PRELOAD_KINDS {
            assert!(results[kind.endpoint()].success);
        }
        assert_eq!(
            results["six-month-average"].data.as_ref().unwrap()["meta"]["params"]
                ["material_code"],
            42
        );
    }

    #[test]
    fn params_filter_accepts_numbers_and_numeric_strings() {
        let mut params = BTreeMap::new();
        params.insert("material_code".to_string(), json!(42));
        assert_eq!(filter_from_params(&params).material_code, Some(42));

        params.insert("material_code".to_string(), json!("42.7"));
        assert_eq!(filter_from_params(&params).material_code, Some(42));

        params.insert("material_code".to_string(), json!("all"));
        assert_eq!(filter_from_params(&params).material_code, None);

        params.insert("material_code".to_string(), json!(true));
        assert_eq!(filter_from_params(&params).material_code, None);
    }
}
