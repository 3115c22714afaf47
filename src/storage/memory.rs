//! Process-local signal store.
//!
//! Used by the `memory` database driver and throughout the test suite.
//! Nothing survives a restart.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::storage::signal_store::{SignalSlice, SignalStore};
use crate::storage::StorageError;
use crate::storage::types::{PatientId, Signal, StoredId};

#[derive(Debug, Default)]
struct Inner {
    next_id: StoredId,
    rows: Vec<Signal>,
}

/// In-memory [`SignalStore`] with the same ordering contract as SQLite.
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    inner: RwLock<Inner>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored signals across all patients.
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filter, order newest first (id descending on ties), then window.
    fn select(
        &self,
        offset: u64,
        limit: u64,
        filter: impl Fn(&Signal) -> bool,
    ) -> SignalSlice {
        let inner = self.inner.read();
        let mut matched: Vec<&Signal> = inner.rows.iter().filter(|s| filter(s)).collect();
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matched.len() as u64;
        let signals = matched
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        SignalSlice { signals, total }
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn write(&self, signal: &Signal) -> Result<StoredId, StorageError> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(Signal {
            id,
            ..signal.clone()
        });
        Ok(id)
    }

    async fn query_range(
        &self,
        patient_id: PatientId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        offset: u64,
        limit: u64,
    ) -> Result<SignalSlice, StorageError> {
        Ok(self.select(offset, limit, |s| {
            s.patient_id == patient_id && s.timestamp >= start && s.timestamp <= end
        }))
    }

    async fn query_latest(
        &self,
        patient_id: PatientId,
        offset: u64,
        limit: u64,
    ) -> Result<SignalSlice, StorageError> {
        Ok(self.select(offset, limit, |s| s.patient_id == patient_id))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
