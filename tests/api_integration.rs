//! API integration tests for the ICU receiver.
//!
//! Each test starts a real server on an ephemeral port and drives it over
//! HTTP (reqwest) and WebSocket (tokio-tungstenite).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures_util::{SinkExt, StreamExt};
use icu_receiver::metrics::SIGNALS_FALLBACK_TOTAL;
use icu_receiver::resilience::{CircuitBreakerConfig, RetryConfig};
use icu_receiver::server::{AppState, INVALID_PAYLOAD_FRAME, create_router};
use icu_receiver::storage::{PatientId, SignalSlice, StoredId};
use icu_receiver::{ResilienceConfig, Signal, SignalStore, StorageBuilder, StorageError, StorageHandles};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

// =============================================================================
// Test Helpers
// =============================================================================

struct TestServer {
    base_url: String,
    ws_url: String,
    state: AppState,
    _handles: StorageHandles,
    _dir: TempDir,
}

fn fast_resilience() -> ResilienceConfig {
    ResilienceConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_number_of_calls: 5,
            wait_duration_in_open_state: Duration::from_secs(60),
            permitted_calls_in_half_open_state: 2,
        },
        retry: RetryConfig {
            max_attempts: 3,
            wait_duration: Duration::from_millis(10),
            backoff_multiplier: 1.0,
        },
    }
}

async fn serve(state: AppState) -> (String, String) {
    let router = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), format!("ws://{addr}/ws/dynamic"))
}

/// Start a server backed by an on-disk SQLite database.
async fn start_test_server() -> TestServer {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let dsn = format!("sqlite:{}?mode=rwc", dir.path().join("icu.db").display());
    let handles = StorageBuilder::new(&dsn)
        .max_connections(2)
        .build()
        .await
        .expect("Failed to build storage");

    let state = AppState::new(handles.store.clone(), &fast_resilience()).unwrap();
    let (base_url, ws_url) = serve(state.clone()).await;

    TestServer {
        base_url,
        ws_url,
        state,
        _handles: handles,
        _dir: dir,
    }
}

async fn latest(client: &reqwest::Client, base_url: &str, patient_id: i64, query: &str) -> Value {
    let resp = client
        .get(format!("{base_url}/api/v1/icu/latest/{patient_id}?{query}"))
        .send()
        .await
        .expect("Failed to send latest request");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("Failed to parse latest response")
}

/// Store that fails every call and counts them.
#[derive(Default)]
struct BrokenStore {
    calls: AtomicU32,
}

impl BrokenStore {
    fn fail(&self) -> StorageError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StorageError::Unavailable("database is down".into())
    }
}

#[async_trait]
impl SignalStore for BrokenStore {
    async fn write(&self, _signal: &Signal) -> Result<StoredId, StorageError> {
        Err(self.fail())
    }

    async fn query_range(
        &self,
        _: PatientId,
        _: NaiveDateTime,
        _: NaiveDateTime,
        _: u64,
        _: u64,
    ) -> Result<SignalSlice, StorageError> {
        Err(self.fail())
    }

    async fn query_latest(&self, _: PatientId, _: u64, _: u64) -> Result<SignalSlice, StorageError> {
        Err(self.fail())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("database is down".into()))
    }
}

// =============================================================================
// Health Probes
// =============================================================================

#[tokio::test]
async fn test_health_probes() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/healthz", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let resp = client
        .get(format!("{}/readyz", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["db"], "ready");
}

#[tokio::test]
async fn test_readyz_reports_unavailable_store() {
    let state = AppState::new(Arc::new(BrokenStore::default()), &fast_resilience()).unwrap();
    let (base_url, _) = serve(state).await;

    let resp = reqwest::get(format!("{base_url}/readyz")).await.unwrap();
    assert_eq!(resp.status(), 503);
}

// =============================================================================
// Upload + Queries
// =============================================================================

#[tokio::test]
async fn test_upload_overrides_client_timestamp() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/v1/icu/upload", server.base_url))
        .json(&json!({
            "patientId": 42,
            "heartbeat": 80,
            "pulse": 70,
            "timestamp": "2020-01-01T00:00:00",
            "ecgSamples": [0.1, 0.2]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({"success": true, "message": "Data received successfully", "data": null})
    );

    let body = latest(&client, &server.base_url, 42, "pageIndex=0&pageSize=1").await;
    let signal = &body["data"]["content"][0];
    assert_eq!(signal["patientId"], 42);
    assert_eq!(signal["ecgSamples"], json!([0.1, 0.2]));
    assert_ne!(signal["timestamp"], "2020-01-01T00:00:00");
}

#[tokio::test]
async fn test_upload_rejections_do_not_write() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    for (payload, prefix) in [
        ("{ invalid", "Invalid payload format"),
        (r#"{"heartbeat":80,"pulse":70}"#, "Validation error: patientId is required"),
        (r#"{"patientId":1.5,"heartbeat":80,"pulse":70}"#, "Validation error:"),
    ] {
        let resp = client
            .post(format!("{}/api/v1/icu/upload", server.base_url))
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "payload {payload}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().starts_with(prefix));
    }

    let body = latest(&client, &server.base_url, 1, "").await;
    assert_eq!(body["data"]["totalElements"], 0);
}

#[tokio::test]
async fn test_latest_returns_most_recent_first() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    for heartbeat in [60, 61] {
        client
            .post(format!("{}/api/v1/icu/upload", server.base_url))
            .json(&json!({"patientId": 42, "heartbeat": heartbeat, "pulse": 70}))
            .send()
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let body = latest(&client, &server.base_url, 42, "page=0&size=1").await;
    let data = &body["data"];
    assert_eq!(data["totalElements"], 2);
    assert_eq!(data["content"].as_array().unwrap().len(), 1);
    assert_eq!(data["content"][0]["heartbeat"], 61.0);
}

#[tokio::test]
async fn test_range_query_pagination() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    for pulse in 0..5 {
        client
            .post(format!("{}/api/v1/icu/upload", server.base_url))
            .json(&json!({"patientId": 7, "heartbeat": 70, "pulse": pulse}))
            .send()
            .await
            .unwrap();
    }

    let url = format!(
        "{}/api/v1/icu/range/7?start=2000-01-01T00:00:00&end=2100-01-01T00:00:00&pageIndex=1&pageSize=2",
        server.base_url
    );
    let body: Value = client.get(&url).send().await.unwrap().json().await.unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Fetched ICU signals in time range");
    assert_eq!(body["data"]["pageIndex"], 1);
    assert_eq!(body["data"]["totalElements"], 5);
    assert_eq!(body["data"]["content"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failing_store_degrades_to_empty_page() {
    let store = Arc::new(BrokenStore::default());
    let state = AppState::new(store.clone(), &fast_resilience()).unwrap();
    let (base_url, _) = serve(state.clone()).await;
    let client = reqwest::Client::new();

    let body = latest(&client, &base_url, 42, "pageIndex=0&pageSize=1").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["content"], json!([]));
    assert_eq!(body["data"]["totalElements"], 0);
    assert_eq!(body["data"]["pageSize"], 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failing_store_upload_still_acknowledged() {
    let store = Arc::new(BrokenStore::default());
    let state = AppState::new(store.clone(), &fast_resilience()).unwrap();
    let (base_url, _) = serve(state.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/api/v1/icu/upload"))
        .json(&json!({"patientId": 42, "heartbeat": 80, "pulse": 70}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(state.metrics.counter(SIGNALS_FALLBACK_TOTAL), 1);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let store = Arc::new(BrokenStore::default());
    let state = AppState::new(store, &fast_resilience()).unwrap();
    let (base_url, _) = serve(state).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base_url}/api/v1/icu/upload"))
        .json(&json!({"patientId": 42, "heartbeat": 80, "pulse": 70}))
        .send()
        .await
        .unwrap();

    let resp = client.get(format!("{base_url}/metrics")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let text = resp.text().await.unwrap();
    assert!(text.contains("# TYPE icu_signals_fallback_total counter"));
    assert!(text.contains("icu_signals_fallback_total 1"));
    assert!(text.contains("icu_signals_saved_total 0"));
}

// =============================================================================
// Push Channel
// =============================================================================

#[tokio::test]
async fn test_push_channel_ingests_and_reports_errors_to_sender() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let (mut ws, _) = connect_async(&server.ws_url).await.expect("ws connect");
    let (mut other, _) = connect_async(&server.ws_url).await.expect("ws connect");

    ws.send(Message::text("{ invalid")).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("error frame")
        .unwrap()
        .unwrap();
    assert_eq!(frame.to_text().unwrap(), INVALID_PAYLOAD_FRAME);

    // The other session hears nothing.
    assert!(
        tokio::time::timeout(Duration::from_millis(100), other.next())
            .await
            .is_err()
    );

    // The connection stays open and accepts valid signals.
    ws.send(Message::text(
        json!({"patientId": 9, "heartbeat": 72.5, "pulse": 71, "ecgSamples": [0.3]}).to_string(),
    ))
    .await
    .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(200), ws.next())
            .await
            .is_err()
    );

    let body = latest(&client, &server.base_url, 9, "").await;
    assert_eq!(body["data"]["totalElements"], 1);
    assert_eq!(body["data"]["content"][0]["heartbeat"], 72.5);
}

#[tokio::test]
async fn test_push_channel_binary_frames() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let (mut ws, _) = connect_async(&server.ws_url).await.expect("ws connect");

    let payload = json!({"nationalId": 11, "heartbeat": 90, "pulse": 88, "ecgList": [1.0, 2.0]});
    ws.send(Message::binary(payload.to_string().into_bytes()))
        .await
        .unwrap();
    ws.send(Message::binary(vec![0xffu8, 0xfe])).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("error frame")
        .unwrap()
        .unwrap();
    assert_eq!(frame.to_text().unwrap(), INVALID_PAYLOAD_FRAME);

    let body = latest(&client, &server.base_url, 11, "").await;
    assert_eq!(body["data"]["content"][0]["ecgSamples"], json!([1.0, 2.0]));
}

#[tokio::test]
async fn test_push_session_lifecycle() {
    let server = start_test_server().await;
    let registry = server.state.registry.clone();

    let (mut ws, _) = connect_async(&server.ws_url).await.expect("ws connect");
    wait_for(|| registry.len() == 1).await;

    ws.close(None).await.unwrap();
    wait_for(|| registry.is_empty()).await;
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}
