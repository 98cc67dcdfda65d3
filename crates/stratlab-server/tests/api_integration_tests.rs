//! Integration tests for the StratLab Server API endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use arrow::array::{Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use stratlab_engine::{AnalysisEngine, AnalysisEngineBuilder, EngineConfig, RetryConfig};
use stratlab_server::routes::create_router;
use stratlab_server::{Server, ServerConfig};

const CSV: &str = "Date,Symbol,Px\n\
2024-01-01,AAPL,100\n\
2024-01-02,AAPL,102\n\
2024-01-03,AAPL,101\n\
2024-01-01,SPY,400\n\
2024-01-02,SPY,404\n\
2024-01-03,SPY,395.92\n";

/// Create a test engine with in-memory backends.
fn create_test_engine() -> Arc<AnalysisEngine> {
    let config = EngineConfig::default()
        .with_workers(2)
        .with_retry(RetryConfig::none());
    Arc::new(
        AnalysisEngineBuilder::new()
            .with_config(config)
            .build()
            .unwrap(),
    )
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post_bytes(app: axum::Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// The CSV fixture as a Parquet file.
fn parquet_upload() -> Vec<u8> {
    // 2024-01-01 as days since the Unix epoch.
    let jan_1 = 19_723;
    let schema = Arc::new(Schema::new(vec![
        Field::new("Date", DataType::Date32, false),
        Field::new("Symbol", DataType::Utf8, false),
        Field::new("Px", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Date32Array::from(vec![
                jan_1,
                jan_1 + 1,
                jan_1 + 2,
                jan_1,
                jan_1 + 1,
                jan_1 + 2,
            ])),
            Arc::new(StringArray::from(vec!["AAPL", "AAPL", "AAPL", "SPY", "SPY", "SPY"])),
            Arc::new(Float64Array::from(vec![
                100.0, 102.0, 101.0, 400.0, 404.0, 395.92,
            ])),
        ],
    )
    .unwrap();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    buffer
}

async fn wait_for_terminal(engine: &Arc<AnalysisEngine>, task_id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) =
            get_json(create_router(engine.clone()), &format!("/api/v1/analyses/{task_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "SUCCESS" || body["status"] == "FAILURE" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_router(create_test_engine());

    let (status, body) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = get_json(app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Analyses
// =============================================================================

#[tokio::test]
async fn test_submit_poll_and_fetch() {
    let engine = create_test_engine();

    let (status, body) = post_json(
        create_router(engine.clone()),
        "/api/v1/analyses",
        json!({ "csv": CSV }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["deduplicated"], false);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    // Workers have not started.
    let (status, body) = get_json(
        create_router(engine.clone()),
        &format!("/api/v1/analyses/{task_id}/result"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "NOT_READY");

    engine.start();
    let snapshot = wait_for_terminal(&engine, &task_id).await;
    assert_eq!(snapshot["status"], "SUCCESS");

    let (status, body) = get_json(
        create_router(engine.clone()),
        &format!("/api/v1/analyses/{task_id}/result"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");

    let result = &body["result"];
    assert_eq!(result["benchmark"], "SPY");
    assert_eq!(result["benchmark_available"], true);
    assert!(result["symbols"]["AAPL"]["var_99"].as_f64().unwrap() > 0.0);
    assert!(result["symbols"]["AAPL"]["beta"].is_object());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_submit_structured_dataset() {
    let engine = create_test_engine();

    let (status, body) = post_json(
        create_router(engine),
        "/api/v1/analyses",
        json!({
            "dataset": {
                "columns": ["Date", "Symbol", "Px"],
                "rows": [
                    ["2024-01-01", "AAPL", 100.0],
                    ["2024-01-02", "AAPL", 102.0],
                    ["2024-01-03", "AAPL", 101.0]
                ]
            },
            "lambda": 0.2,
            "benchmark": "QQQ",
            "ttl_secs": 600
        }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["task_id"].is_string());
}

#[tokio::test]
async fn test_idempotency_header_deduplicates() {
    let engine = create_test_engine();

    let submit = |engine: Arc<AnalysisEngine>| async move {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/analyses")
            .header("content-type", "application/json")
            .header("Idempotency-Key", "upload-7")
            .body(Body::from(json!({ "csv": CSV }).to_string()))
            .unwrap();
        send(create_router(engine), request).await
    };

    let (status, first) = submit(engine.clone()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, second) = submit(engine.clone()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_eq!(first["task_id"], second["task_id"]);
    assert_eq!(second["deduplicated"], true);
}

#[tokio::test]
async fn test_submit_rejects_out_of_range_lambda() {
    let (status, body) = post_json(
        create_router(create_test_engine()),
        "/api/v1/analyses",
        json!({ "csv": CSV, "lambda": 1.5 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_submit_requires_a_dataset() {
    let (status, body) = post_json(
        create_router(create_test_engine()),
        "/api/v1/analyses",
        json!({ "lambda": 0.1 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unusable_dataset_reports_failure() {
    let engine = create_test_engine();
    engine.start();

    let (status, body) = post_json(
        create_router(engine.clone()),
        "/api/v1/analyses",
        json!({ "csv": "Date,Symbol,Px\n2024-01-01,AAPL,abc\n" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let snapshot = wait_for_terminal(&engine, &task_id).await;
    assert_eq!(snapshot["status"], "FAILURE");

    let (status, body) = get_json(
        create_router(engine.clone()),
        &format!("/api/v1/analyses/{task_id}/result"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILURE");
    assert!(body["error"]["message"].is_string());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unknown_task_not_found() {
    let engine = create_test_engine();

    let (status, body) = get_json(create_router(engine.clone()), "/api/v1/analyses/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = get_json(create_router(engine), "/api/v1/analyses/nope/result").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_task_id_is_bad_request() {
    let engine = create_test_engine();
    let long = "x".repeat(500);

    for uri in [
        "/api/v1/analyses/two%20words".to_string(),
        "/api/v1/analyses/caf%C3%A9/result".to_string(),
        format!("/api/v1/analyses/{long}"),
    ] {
        let (status, body) = get_json(create_router(engine.clone()), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
}

// =============================================================================
// File uploads
// =============================================================================

#[tokio::test]
async fn test_parquet_upload_is_analysed() {
    let engine = create_test_engine();

    let (status, body) = post_bytes(
        create_router(engine.clone()),
        "/api/v1/analyses/upload?lambda=0.1&benchmark=spy",
        parquet_upload(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    engine.start();
    let snapshot = wait_for_terminal(&engine, &task_id).await;
    assert_eq!(snapshot["status"], "SUCCESS");

    let (status, body) = get_json(
        create_router(engine.clone()),
        &format!("/api/v1/analyses/{task_id}/result"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["benchmark"], "SPY");
    assert!(body["result"]["symbols"]["AAPL"]["var_99"].as_f64().unwrap() > 0.0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_csv_upload_with_idempotency_key() {
    let engine = create_test_engine();
    let uri = "/api/v1/analyses/upload?idempotency_key=file-1";

    let (status, first) = post_bytes(create_router(engine.clone()), uri, CSV.as_bytes().to_vec()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (_, second) = post_bytes(create_router(engine), uri, CSV.as_bytes().to_vec()).await;

    assert_eq!(first["task_id"], second["task_id"]);
    assert_eq!(second["deduplicated"], true);
}

#[tokio::test]
async fn test_upload_rejects_empty_and_binary_bodies() {
    let engine = create_test_engine();

    let (status, _) = post_bytes(create_router(engine.clone()), "/api/v1/analyses/upload", Vec::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_bytes(
        create_router(engine),
        "/api/v1/datasets/inspect/upload",
        vec![0xff, 0xfe, 0x00, 0x81],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_inspect_parquet_upload() {
    let (status, body) = post_bytes(
        create_router(create_test_engine()),
        "/api/v1/datasets/inspect/upload",
        parquet_upload(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 6);
    assert_eq!(body["symbols"]["SPY"]["observations"], 3);
    assert_eq!(body["first_date"], "2024-01-01");
    assert_eq!(body["last_date"], "2024-01-03");
}

// =============================================================================
// Server
// =============================================================================

#[tokio::test]
async fn test_server_refuses_invalid_host() {
    let config = ServerConfig {
        host: "not-an-ip".into(),
        ..ServerConfig::default()
    };
    let err = Server::new(config, create_test_engine())
        .start()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

// =============================================================================
// Datasets
// =============================================================================

#[tokio::test]
async fn test_inspect_dataset() {
    let (status, body) = post_json(
        create_router(create_test_engine()),
        "/api/v1/datasets/inspect",
        json!({ "csv": CSV }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 6);
    assert_eq!(body["rows_accepted"], 6);
    assert_eq!(body["symbols"]["AAPL"]["observations"], 3);
    assert_eq!(body["first_date"], "2024-01-01");
    assert_eq!(body["last_date"], "2024-01-03");
}

#[tokio::test]
async fn test_inspect_missing_column() {
    let (status, body) = post_json(
        create_router(create_test_engine()),
        "/api/v1/datasets/inspect",
        json!({ "csv": "When,What\n2024-01-01,AAPL\n" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
