use httpmock::prelude::*;
use serde_json::json;

use insumo_api_types::BatchItemSpec;
use insumo_cli::{ApiClient, CliError};

fn report_body(query: &str) -> serde_json::Value {
    json!({
        "data": [{ "material": "Bearing 6204", "material_code": 1101 }],
        "meta": { "count": 1, "query": query },
    })
}

#[tokio::test]
async fn report_is_served_from_the_local_cache_within_ttl() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/materials");
            then.status(200).json_body(report_body("materials"));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    let first = client.report("materials", None).await.expect("first read");
    let second = client.report("materials", None).await.expect("second read");

    assert_eq!(first, second);
    assert_eq!(first.meta.count, 1);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn filtered_and_unfiltered_reads_are_distinct_cache_entries() {
    let server = MockServer::start_async().await;
    let unfiltered = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/six-month-average")
                .query_param_missing("material_code");
            then.status(200).json_body(report_body("six-month-average"));
        })
        .await;
    let filtered = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/six-month-average")
                .query_param("material_code", "7");
            then.status(200).json_body(report_body("six-month-average"));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    client
        .report("six-month-average", None)
        .await
        .expect("unfiltered");
    client
        .report("six-month-average", Some(7))
        .await
        .expect("filtered");
    client
        .report("six-month-average", Some(7))
        .await
        .expect("filtered again");

    unfiltered.assert_hits_async(1).await;
    filtered.assert_hits_async(1).await;
}

#[tokio::test]
async fn api_errors_decode_into_structured_form() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/nonexistent-report");
            then.status(404).json_body(json!({
                "error": {
                    "code": "not_found",
                    "message": "Unknown report endpoint",
                }
            }));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    let error = client
        .report("nonexistent-report", None)
        .await
        .expect_err("should fail");

    match error {
        CliError::Api {
            status,
            code,
            message,
            ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(code, "not_found");
            assert_eq!(message, "Unknown report endpoint");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn health_bypasses_the_cache() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({
                "status": "ok",
                "timestamp": "2026-02-01T08:00:00Z",
            }));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    client.health().await.expect("first probe");
    client.health().await.expect("second probe");

    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn remove_recipient_accepts_no_content() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/alert-recipients/3");
            then.status(204);
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");
    client.remove_recipient(3).await.expect("deactivation");
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn batch_bounds_are_enforced_before_any_dispatch() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(200).json_body(json!({
                "success": true,
                "count": 0,
                "results": {},
                "timestamp": "2026-02-01T08:00:00Z",
            }));
        })
        .await;

    let client = ApiClient::new(&server.base_url()).expect("client");

    let empty = client.batch(Vec::new()).await;
    assert!(matches!(empty, Err(CliError::Usage(_))));

    let oversized: Vec<BatchItemSpec> = (0..11)
        .map(|index| BatchItemSpec {
            endpoint: format!("endpoint-{index}"),
            params: Default::default(),
        })
        .collect();
    let too_many = client.batch(oversized).await;
    assert!(matches!(too_many, Err(CliError::Usage(_))));

    mock.assert_hits_async(0).await;
}
