//! Storage collaborator contract.
//!
//! The resilience layer only ever talks to a [`SignalStore`]. Backends are
//! required to return rows ordered newest first, breaking timestamp ties by
//! storage id descending, so pagination is reproducible.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::storage::StorageError;
use crate::storage::types::{PatientId, Signal, StoredId};

/// One window of query results plus the unpaginated match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSlice {
    pub signals: Vec<Signal>,
    pub total: u64,
}

/// Durable key/range store for signals.
#[async_trait]
pub trait SignalStore: Send + Sync + 'static {
    /// Persist a signal and return its assigned id.
    ///
    /// All-or-nothing: on error nothing from this signal is visible to readers.
    async fn write(&self, signal: &Signal) -> Result<StoredId, StorageError>;

    /// Signals for a patient with `start <= timestamp <= end`.
    async fn query_range(
        &self,
        patient_id: PatientId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        offset: u64,
        limit: u64,
    ) -> Result<SignalSlice, StorageError>;

    /// Most recent signals for a patient, unconstrained by time.
    async fn query_latest(
        &self,
        patient_id: PatientId,
        offset: u64,
        limit: u64,
    ) -> Result<SignalSlice, StorageError>;

    /// Cheap liveness check used by the readiness probe.
    async fn ping(&self) -> Result<(), StorageError>;
}
