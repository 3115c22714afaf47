//! Prometheus metrics for the ICU receiver.
//!
//! The core reports counts and durations through [`MetricsRecorder`] and
//! does not know about the exporter. [`PrometheusRecorder`] owns a registry
//! per application instance and renders it in the text exposition format
//! for `GET /metrics`.
//!
//! - `icu_signals_saved_total` - signals stored
//! - `icu_signals_rejected_total` - payloads failing decode or validation
//! - `icu_signals_fallback_total` - signals dropped by the write fallback
//! - `icu_signals_query_total` - range and latest queries
//! - `icu_signals_query_duration_seconds` - query latency histogram
//! - `icu_signals_query_fallback_total` - queries answered with an empty page

use std::time::Duration;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

pub const SIGNALS_SAVED_TOTAL: &str = "icu_signals_saved_total";
pub const SIGNALS_REJECTED_TOTAL: &str = "icu_signals_rejected_total";
pub const SIGNALS_FALLBACK_TOTAL: &str = "icu_signals_fallback_total";
pub const QUERY_TOTAL: &str = "icu_signals_query_total";
pub const QUERY_DURATION: &str = "icu_signals_query_duration_seconds";
pub const QUERY_FALLBACK_TOTAL: &str = "icu_signals_query_fallback_total";

const QUERY_DURATION_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Sink for counters and timers.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Add one to a counter.
    fn increment(&self, name: &'static str);

    /// Record one observation of a timer.
    fn record_duration(&self, name: &'static str, elapsed: Duration);
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn increment(&self, _name: &'static str) {}

    fn record_duration(&self, _name: &'static str, _elapsed: Duration) {}
}

/// Recorder backed by a Prometheus registry.
#[derive(Clone)]
pub struct PrometheusRecorder {
    registry: Registry,
    saved: IntCounter,
    rejected: IntCounter,
    fallback: IntCounter,
    query_total: IntCounter,
    query_fallback: IntCounter,
    query_duration: Histogram,
}

impl std::fmt::Debug for PrometheusRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusRecorder").finish_non_exhaustive()
    }
}

impl PrometheusRecorder {
    /// Create the metrics and register them in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let saved = counter(SIGNALS_SAVED_TOTAL, "Signals stored")?;
        let rejected = counter(
            SIGNALS_REJECTED_TOTAL,
            "Payloads rejected by decoding or validation",
        )?;
        let fallback = counter(SIGNALS_FALLBACK_TOTAL, "Signals dropped by the write fallback")?;
        let query_total = counter(QUERY_TOTAL, "Range and latest queries")?;
        let query_fallback = counter(
            QUERY_FALLBACK_TOTAL,
            "Queries answered with the empty-page fallback",
        )?;

        let query_duration = Histogram::with_opts(
            HistogramOpts::new(QUERY_DURATION, "Signal query latency")
                .buckets(QUERY_DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(query_duration.clone()))?;

        Ok(Self {
            registry,
            saved,
            rejected,
            fallback,
            query_total,
            query_fallback,
            query_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn counter_for(&self, name: &str) -> Option<&IntCounter> {
        match name {
            SIGNALS_SAVED_TOTAL => Some(&self.saved),
            SIGNALS_REJECTED_TOTAL => Some(&self.rejected),
            SIGNALS_FALLBACK_TOTAL => Some(&self.fallback),
            QUERY_TOTAL => Some(&self.query_total),
            QUERY_FALLBACK_TOTAL => Some(&self.query_fallback),
            _ => None,
        }
    }

    /// Current value of a counter (0 for an unknown name).
    pub fn counter(&self, name: &str) -> u64 {
        self.counter_for(name).map(IntCounter::get).unwrap_or(0)
    }

    /// Number of observations recorded for a histogram.
    pub fn histogram_count(&self, name: &str) -> u64 {
        match name {
            QUERY_DURATION => self.query_duration.get_sample_count(),
            _ => 0,
        }
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }
        match String::from_utf8(buffer) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
                String::new()
            }
        }
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn increment(&self, name: &'static str) {
        match self.counter_for(name) {
            Some(c) => c.inc(),
            None => tracing::debug!(metric = name, "Unknown counter"),
        }
    }

    fn record_duration(&self, name: &'static str, elapsed: Duration) {
        match name {
            QUERY_DURATION => self.query_duration.observe(elapsed.as_secs_f64()),
            _ => tracing::debug!(metric = name, "Unknown histogram"),
        }
    }
}
