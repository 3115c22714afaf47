//! Ingestion pipeline shared by the push channel and the upload endpoint.
//!
//! `decode -> validate -> stamp -> gateway.write`. Decode and validation
//! failures are returned to the caller and nothing is written. Once a signal
//! is valid the caller always gets [`Accepted`], whether the gateway stored
//! it or ran its fallback.

use std::sync::Arc;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::gateway::PersistenceGateway;
use crate::metrics::{MetricsRecorder, SIGNALS_REJECTED_TOTAL};
use crate::signal::{SignalPayload, ValidationError, validate};
use crate::storage::PatientId;

/// Path a payload arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Transport {
    PushChannel,
    Upload,
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload could not be parsed.
    #[error("{0}")]
    Decode(String),

    /// The payload parsed but broke a constraint.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Acknowledgement for a valid signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accepted {
    pub patient_id: PatientId,
    /// Server-assigned acceptance time (UTC).
    pub timestamp: NaiveDateTime,
}

pub struct IngestionPipeline {
    gateway: Arc<PersistenceGateway>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl IngestionPipeline {
    pub fn new(gateway: Arc<PersistenceGateway>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self { gateway, metrics }
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    /// Ingest one UTF-8 JSON payload.
    pub async fn ingest(&self, raw: &str, transport: Transport) -> Result<Accepted, IngestError> {
        let valid = match SignalPayload::decode(raw)
            .map_err(IngestError::from)
            .and_then(|p| validate(p).map_err(IngestError::from))
        {
            Ok(valid) => valid,
            Err(e) => {
                self.metrics.increment(SIGNALS_REJECTED_TOTAL);
                tracing::debug!(%transport, error = %e, "Payload rejected");
                return Err(e);
            }
        };

        // Storage keeps microseconds.
        let signal = valid.accept_at(Utc::now().naive_utc().trunc_subsecs(6));
        let accepted = Accepted {
            patient_id: signal.patient_id,
            timestamp: signal.timestamp,
        };

        let outcome = self.gateway.write(signal).await;
        tracing::debug!(
            %transport,
            patient_id = accepted.patient_id,
            outcome = outcome.as_ref(),
            "Signal ingested"
        );

        Ok(accepted)
    }

    /// Ingest a binary frame; it must be UTF-8 JSON.
    pub async fn ingest_bytes(
        &self,
        raw: &[u8],
        transport: Transport,
    ) -> Result<Accepted, IngestError> {
        match std::str::from_utf8(raw) {
            Ok(text) => self.ingest(text, transport).await,
            Err(e) => {
                self.metrics.increment(SIGNALS_REJECTED_TOTAL);
                tracing::debug!(%transport, error = %e, "Binary payload is not UTF-8");
                Err(IngestError::Decode(format!("payload is not valid UTF-8: {e}")))
            }
        }
    }
}
