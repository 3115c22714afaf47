//! Persistence gateway: resilient write path to the signal store.
//!
//! Every write goes through a [`ResiliencePolicy`]. When the policy gives up
//! (retries exhausted or circuit open) the fallback records the loss and the
//! caller still gets a definite [`WriteOutcome`]; storage errors never reach
//! the ingestion layer.

use std::sync::Arc;

use strum_macros::{AsRefStr, Display};

use crate::metrics::{MetricsRecorder, SIGNALS_FALLBACK_TOTAL, SIGNALS_SAVED_TOTAL};
use crate::resilience::{CircuitState, ResilienceConfig, ResilienceError, ResiliencePolicy};
use crate::storage::{Signal, SignalStore, StoredId};

/// Circuit name used for the write family.
pub const WRITE_CIRCUIT: &str = "icu-write";

/// Result of a gateway write.
///
/// Ingestion treats both variants as acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum WriteOutcome {
    /// The store accepted the signal and assigned an id.
    Stored(StoredId),
    /// The fallback ran; the signal was not persisted.
    FallbackInvoked,
}

impl WriteOutcome {
    pub fn stored_id(&self) -> Option<StoredId> {
        match self {
            Self::Stored(id) => Some(*id),
            Self::FallbackInvoked => None,
        }
    }
}

pub struct PersistenceGateway {
    store: Arc<dyn SignalStore>,
    policy: ResiliencePolicy,
    metrics: Arc<dyn MetricsRecorder>,
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PersistenceGateway {
    pub fn new(
        store: Arc<dyn SignalStore>,
        config: &ResilienceConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            store,
            policy: ResiliencePolicy::new(WRITE_CIRCUIT, config),
            metrics,
        }
    }

    /// Current state of the write circuit.
    pub fn circuit_state(&self) -> CircuitState {
        self.policy.state()
    }

    /// Persist a signal, falling back instead of failing.
    pub async fn write(&self, signal: Signal) -> WriteOutcome {
        let store = &self.store;
        let record = &signal;

        match self.policy.call(|| store.write(record)).await {
            Ok(id) => {
                self.metrics.increment(SIGNALS_SAVED_TOTAL);
                tracing::debug!(patient_id = signal.patient_id, id, "Signal stored");
                WriteOutcome::Stored(id)
            }
            Err(e) => {
                self.fallback(&signal, &e);
                WriteOutcome::FallbackInvoked
            }
        }
    }

    fn fallback(&self, signal: &Signal, cause: &ResilienceError) {
        self.metrics.increment(SIGNALS_FALLBACK_TOTAL);
        tracing::error!(
            patient_id = signal.patient_id,
            timestamp = %signal.timestamp,
            error = %cause,
            "Failed to save signal"
        );
        tracing::warn!(
            patient_id = signal.patient_id,
            circuit = %self.policy.state(),
            "Signal dropped by write fallback, not persisted"
        );
    }
}
