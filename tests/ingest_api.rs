//! HTTP tests for stat ingestion and the admin endpoints.
//!
//! Each test builds a real router over an isolated registry and drives it
//! with `tower::ServiceExt::oneshot`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tower::ServiceExt;

use stat_sink::error::{Error, Result};
use stat_sink::server::create_router;
use stat_sink::writer::{BufferedUploadConfig, DocumentStore, UploadTarget, WriterConfig};
use stat_sink::{AppState, Stat, StreamPaths, StreamRegistry};

fn state_with(config: WriterConfig, log_dir: &Path) -> Arc<AppState> {
    let registry = Arc::new(StreamRegistry::new(
        Arc::new(config),
        StreamPaths {
            log_dir: log_dir.to_path_buf(),
            sandboxed: true,
        },
    ));
    Arc::new(AppState::new(registry))
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

async fn error_message(resp: axum::response::Response) -> String {
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
    json["error"].as_str().unwrap().to_owned()
}

/// Fails every insert into collections listed in `broken`.
#[derive(Default)]
struct FlakyStore {
    docs: Mutex<Vec<(String, Stat)>>,
    broken: Vec<String>,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn add_document(&self, collection: &str, stat: &Stat) -> Result<()> {
        if self.broken.iter().any(|c| c == collection) {
            return Err(Error::DocumentStore("connection reset".into()));
        }
        self.docs.lock().push((collection.to_owned(), stat.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------

#[tokio::test]
async fn post_appends_line_and_answers_ok() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(WriterConfig::SimpleLog, dir.path());
    let app = create_router(state.clone());

    let resp = app
        .clone()
        .oneshot(post("/cpu", r#"{"value":[0.5],"time":"2024-01-01T00:00:00Z","id":"user"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-response-time-us"));
    assert_eq!(body_bytes(resp.into_body()).await, b"OK\n");

    let resp = app
        .oneshot(post("/cpu/ignored/suffix", r#"{"value":[1.5],"id":"system"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let contents = std::fs::read_to_string(dir.path().join("cpu.log")).unwrap();
    let stats: Vec<Stat> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].id, "user");
    assert_eq!(stats[1].value, vec![1.5]);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn concatenated_objects_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state_with(WriterConfig::SimpleLog, dir.path()));

    let resp = app
        .oneshot(post("/cpu", r#"{"id":"a"}{"id":"b"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!error_message(resp).await.is_empty());

    let contents = std::fs::read_to_string(dir.path().join("cpu.log")).unwrap();
    assert!(contents.is_empty());
}

#[tokio::test]
async fn trailing_whitespace_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state_with(WriterConfig::SimpleLog, dir.path()));

    let resp = app
        .oneshot(post("/mem", "{\"id\":\"a\",\"value\":[]}\n  \n"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state_with(WriterConfig::SimpleLog, dir.path()));

    let padding = " ".repeat(4024 * 1024);
    let resp = app
        .oneshot(post("/cpu", format!(r#"{{"id":"a"}}{padding}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn invalid_keys_are_client_errors() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(WriterConfig::SimpleLog, dir.path());
    let app = create_router(state.clone());

    let resp = app.clone().oneshot(post("/", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(resp).await, "invalid path");

    let resp = app.oneshot(post("/..%2Fetc", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn non_post_is_method_not_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state_with(WriterConfig::SimpleLog, dir.path()));

    let resp = app.oneshot(get("/cpu")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn setup_failure_is_server_error_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("not-yet");
    let state = state_with(WriterConfig::SimpleLog, &missing);
    let app = create_router(state.clone());

    let resp = app.clone().oneshot(post("/cpu", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(resp).await, "error creating stats writer");
    assert!(state.registry.is_empty());

    // Once the directory exists the next request creates the writer.
    std::fs::create_dir_all(&missing).unwrap();
    let resp = app.oneshot(post("/cpu", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn document_store_mode_inserts_into_stream_collection() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyStore::default());
    let app = create_router(state_with(WriterConfig::DocumentStore(store.clone()), dir.path()));

    let resp = app
        .oneshot(post("/gpu", r#"{"id":"temp","value":[71.0]}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let docs = store.docs.lock();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].0, dir.path().join("gpu.log").to_string_lossy());
    assert_eq!(docs[0].1.value, vec![71.0]);
}

#[tokio::test]
async fn document_store_failure_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyStore {
        broken: vec![dir.path().join("gpu.log").to_string_lossy().into_owned()],
        ..Default::default()
    });
    let state = state_with(WriterConfig::DocumentStore(store), dir.path());
    let app = create_router(state.clone());

    let resp = app.oneshot(post("/gpu", r#"{"id":"temp"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(resp).await, "error writing stats");

    // The writer exists; only the write failed.
    let streams = state.registry.list().await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].request_count, 0);
}

#[tokio::test]
async fn buffered_upload_mode_flushes_on_shutdown() {
    use futures::TryStreamExt;
    use object_store::memory::InMemory;
    use object_store::ObjectStore;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemory::new());
    let upload = BufferedUploadConfig {
        flush_on_stop: true,
        ..BufferedUploadConfig::new(UploadTarget {
            bucket: "stats".into(),
            store: store.clone(),
        })
    };
    let state = state_with(WriterConfig::BufferedUpload(upload), dir.path());
    let app = create_router(state.clone());

    for i in 0..3 {
        let resp = app
            .clone()
            .oneshot(post("/disk", format!(r#"{{"id":"io","value":[{i}]}}"#)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // Nothing is uploaded before the first flush interval.
    let listed: Vec<_> = store.list(None).try_collect().await.unwrap();
    assert!(listed.is_empty());

    state.registry.shutdown().await;

    let listed: Vec<_> = store.list(None).try_collect().await.unwrap();
    assert_eq!(listed.len(), 1);
    let body = store.get(&listed[0].location).await.unwrap().bytes().await.unwrap();
    let batch: Vec<Stat> = serde_json::from_slice(&body).unwrap();
    let values: Vec<f64> = batch.iter().map(|s| s.value[0]).collect();
    assert_eq!(values, [0.0, 1.0, 2.0]);

    // Writes after shutdown are refused rather than silently lost.
    let resp = app.oneshot(post("/disk", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ---------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------

#[tokio::test]
async fn streams_endpoint_lists_writers() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state_with(WriterConfig::SimpleLog, dir.path()));

    for key in ["net", "cpu", "net"] {
        let resp = app.clone().oneshot(post(&format!("/{key}"), "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app.oneshot(get("/api/streams")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
    let streams = json.as_array().unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0]["key"], "cpu");
    assert_eq!(streams[1]["key"], "net");
    assert_eq!(streams[1]["request_count"], 2);
    assert_eq!(streams[1]["kind"], "simple-log");
}

#[tokio::test]
async fn metrics_endpoint_reports_requests() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state_with(WriterConfig::SimpleLog, dir.path()));

    app.clone().oneshot(post("/cpu", "{}")).await.unwrap();
    app.clone().oneshot(post("/cpu", "not json")).await.unwrap();

    let resp = app.oneshot(get("/api/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
    assert_eq!(json["total_requests"], 2);
    assert_eq!(json["total_errors"], 1);
    assert_eq!(json["streams"], 1);
    assert_eq!(json["current_visits"], 2);
    assert_eq!(json["write_latency"]["count"], 1);
}

#[tokio::test]
async fn unknown_api_path_is_not_a_stream() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(WriterConfig::SimpleLog, dir.path());
    let app = create_router(state.clone());

    let resp = app.oneshot(post("/api/nothing", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(state.registry.is_empty());
}
