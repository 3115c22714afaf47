//! Query service: paginated, resilient reads of stored signals.
//!
//! Range and latest queries each run behind their own [`ResiliencePolicy`],
//! so a tripped range circuit does not block latest lookups. When a policy
//! gives up the caller receives an empty page (`totalElements = 0`) that
//! echoes the requested page index and size.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;

use crate::metrics::{MetricsRecorder, QUERY_DURATION, QUERY_FALLBACK_TOTAL, QUERY_TOTAL};
use crate::resilience::{CircuitState, ResilienceConfig, ResilienceError, ResiliencePolicy};
use crate::storage::{Page, PageRequest, PatientId, Signal, SignalSlice, SignalStore};

pub const RANGE_CIRCUIT: &str = "icu-query-range";
pub const LATEST_CIRCUIT: &str = "icu-query-latest";

pub struct QueryService {
    store: Arc<dyn SignalStore>,
    range: ResiliencePolicy,
    latest: ResiliencePolicy,
    metrics: Arc<dyn MetricsRecorder>,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("range", &self.range)
            .field("latest", &self.latest)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    pub fn new(
        store: Arc<dyn SignalStore>,
        config: &ResilienceConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            store,
            range: ResiliencePolicy::new(RANGE_CIRCUIT, config),
            latest: ResiliencePolicy::new(LATEST_CIRCUIT, config),
            metrics,
        }
    }

    pub fn range_circuit_state(&self) -> CircuitState {
        self.range.state()
    }

    pub fn latest_circuit_state(&self) -> CircuitState {
        self.latest.state()
    }

    /// Signals for `patient_id` with `start <= timestamp <= end`, newest first.
    pub async fn find_by_range(
        &self,
        patient_id: PatientId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        request: PageRequest,
    ) -> Page<Signal> {
        let store = &self.store;
        let (offset, limit) = (request.offset(), request.limit());

        let started = Instant::now();
        let result = self
            .range
            .call(|| store.query_range(patient_id, start, end, offset, limit))
            .await;
        self.finish(&self.range, patient_id, request, started, result)
    }

    /// Most recent signals for `patient_id`, newest first.
    pub async fn find_latest(&self, patient_id: PatientId, request: PageRequest) -> Page<Signal> {
        let store = &self.store;
        let (offset, limit) = (request.offset(), request.limit());

        let started = Instant::now();
        let result = self
            .latest
            .call(|| store.query_latest(patient_id, offset, limit))
            .await;
        self.finish(&self.latest, patient_id, request, started, result)
    }

    fn finish(
        &self,
        policy: &ResiliencePolicy,
        patient_id: PatientId,
        request: PageRequest,
        started: Instant,
        result: Result<SignalSlice, ResilienceError>,
    ) -> Page<Signal> {
        self.metrics.increment(QUERY_TOTAL);
        self.metrics.record_duration(QUERY_DURATION, started.elapsed());

        match result {
            Ok(slice) => Page::new(slice.signals, request, slice.total),
            Err(e) => {
                self.metrics.increment(QUERY_FALLBACK_TOTAL);
                tracing::warn!(
                    operation = policy.name(),
                    patient_id,
                    page_index = request.page_index,
                    page_size = request.page_size,
                    error = %e,
                    "Query failed, returning empty page"
                );
                Page::empty(request)
            }
        }
    }
}
