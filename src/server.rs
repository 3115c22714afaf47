//! HTTP and push-channel surface for the ICU receiver.
//!
//! Routes:
//! - `POST /api/v1/icu/upload`: one-shot signal upload
//! - `GET  /api/v1/icu/range/{patient_id}`: signals in an inclusive time range
//! - `GET  /api/v1/icu/latest/{patient_id}`: most recent signals
//! - `GET  /ws/dynamic`: push channel
//! - `GET  /healthz`, `/readyz`, `/metrics`

mod push;
mod response;
mod signals;

use std::any::Any;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::gateway::PersistenceGateway;
use crate::ingest::IngestionPipeline;
use crate::metrics::PrometheusRecorder;
use crate::query::QueryService;
use crate::resilience::ResilienceConfig;
use crate::session::ConnectionRegistry;
use crate::storage::SignalStore;

pub use push::INVALID_PAYLOAD_FRAME;
pub use response::{ApiError, ApiResponse};
pub use signals::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub queries: Arc<QueryService>,
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<dyn SignalStore>,
    pub metrics: Arc<PrometheusRecorder>,
}

impl AppState {
    /// Wire the gateway, pipeline and query service around `store`.
    ///
    /// Fails only if the metrics cannot be registered.
    pub fn new(
        store: Arc<dyn SignalStore>,
        resilience: &ResilienceConfig,
    ) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(PrometheusRecorder::new()?);
        let gateway = Arc::new(PersistenceGateway::new(
            store.clone(),
            resilience,
            metrics.clone(),
        ));

        Ok(Self {
            pipeline: Arc::new(IngestionPipeline::new(gateway, metrics.clone())),
            queries: Arc::new(QueryService::new(store.clone(), resilience, metrics.clone())),
            registry: Arc::new(ConnectionRegistry::new()),
            store,
            metrics,
        })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/api/v1/icu/upload", post(signals::upload_handler))
        .route("/api/v1/icu/range/{patient_id}", get(signals::range_handler))
        .route("/api/v1/icu/latest/{patient_id}", get(signals::latest_handler))
        .route("/ws/dynamic", get(push::push_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unexpected failure");
    ApiError::Internal(detail.to_string()).into_response()
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that pings the signal store.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        state.metrics.gather(),
    )
}
