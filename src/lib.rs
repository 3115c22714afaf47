//! ICU Receiver
//!
//! Ingests bedside telemetry (heartbeat, pulse, ECG samples) over a
//! WebSocket push channel and a REST upload endpoint, stores each reading
//! with a server-assigned timestamp, and serves paginated range and latest
//! queries per patient.
//!
//! # Architecture
//!
//! - **Ingestion**: [`ingest::IngestionPipeline`] decodes, validates and stamps payloads
//! - **Persistence**: [`gateway::PersistenceGateway`] writes through a circuit breaker with retries and a fallback
//! - **Queries**: [`query::QueryService`] reads through per-family breakers, degrading to empty pages
//! - **Storage**: [`storage::SignalStore`] backed by SQLite (sqlx) or memory
//! - **Sessions**: [`session::ConnectionRegistry`] tracks live push-channel connections
//!
//! # Example
//!
//! ```rust,no_run
//! use icu_receiver::{AppState, ResilienceConfig, StorageBuilder, create_router};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::memory().build().await?;
//! let state = AppState::new(handles.store.clone(), &ResilienceConfig::default())?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, create_router(state)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod resilience;
pub mod server;
pub mod session;
pub mod signal;
pub mod storage;

pub use config::{AppConfig, ConfigError, DatabaseDriver};
pub use gateway::{PersistenceGateway, WriteOutcome};
pub use ingest::{Accepted, IngestError, IngestionPipeline, Transport};
pub use metrics::{MetricsRecorder, NoopRecorder, PrometheusRecorder};
pub use query::QueryService;
pub use resilience::{CircuitBreaker, CircuitState, ResilienceConfig, ResiliencePolicy};
pub use server::{AppState, create_router};
pub use session::{ConnectionRegistry, SessionHandle, SessionId};
pub use signal::{SignalPayload, ValidationError};
pub use storage::{
    MemorySignalStore, Page, PageRequest, Signal, SignalStore, SqlitePool, StorageBuilder,
    StorageError, StorageHandles,
};
