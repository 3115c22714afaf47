//! Core data types for the storage layer.
//!
//! - [`Signal`]: one timestamped physiological reading for a patient
//! - [`Page`]: a bounded, ordered window over a larger result set
//! - [`PageRequest`]: zero-based page index plus page size

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Patient identifier. Always positive once a signal has been validated.
pub type PatientId = i64;

/// Identifier assigned by the store on a successful write.
pub type StoredId = i64;

/// A signal persisted in the `signals` table.
///
/// `timestamp` is assigned by the server at acceptance and is interpreted as
/// UTC. `id` is zero until the store has accepted the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// Store-assigned identifier (0 before acceptance).
    #[serde(default)]
    pub id: StoredId,
    /// Patient the reading belongs to.
    pub patient_id: PatientId,
    /// Heartbeat reading as supplied by the device.
    pub heartbeat: f64,
    /// Pulse reading as supplied by the device.
    pub pulse: f64,
    /// Server-side acceptance time (UTC, no offset on the wire).
    pub timestamp: NaiveDateTime,
    /// ECG samples in device order.
    #[serde(default)]
    pub ecg_samples: Vec<f64>,
}

impl Signal {
    /// Timestamp as Unix microseconds, the storage representation.
    pub fn timestamp_micros(&self) -> i64 {
        to_micros(self.timestamp)
    }
}

/// Convert a naive UTC timestamp to Unix microseconds.
pub fn to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

/// Convert Unix microseconds back to a naive UTC timestamp.
pub fn from_micros(micros: i64) -> Result<NaiveDateTime, StorageError> {
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {micros}")))
}

/// Zero-based page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page_index: u32, page_size: u32) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    /// Number of items to skip in the full ordered result.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_index) * u64::from(self.page_size)
    }

    /// Maximum number of items on this page.
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// Ordered, size-bounded window over a larger result set.
///
/// `content` holds items `[page_index * page_size, page_index * page_size + page_size)`
/// of the full ordered result and never exceeds `page_size` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page_index: u32,
    pub page_size: u32,
    pub total_elements: u64,
}

impl<T> Page<T> {
    /// Build a page, truncating `content` to the page size.
    pub fn new(mut content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        content.truncate(request.page_size as usize);
        Self {
            content,
            page_index: request.page_index,
            page_size: request.page_size,
            total_elements,
        }
    }

    /// Explicitly empty page used by query fallbacks.
    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Map page content while keeping the pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page_index: self.page_index,
            page_size: self.page_size,
            total_elements: self.total_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_micros_roundtrip_preserves_subsecond() {
        let t = ts(14, 30, 0) + chrono::Duration::microseconds(123_456);
        assert_eq!(from_micros(to_micros(t)).unwrap(), t);
    }

    #[test]
    fn test_from_micros_out_of_range() {
        assert!(from_micros(i64::MAX).is_err());
    }

    #[test]
    fn test_page_request_offset() {
        let req = PageRequest::new(3, 50);
        assert_eq!(req.offset(), 150);
        assert_eq!(req.limit(), 50);
    }

    #[test]
    fn test_page_truncates_to_page_size() {
        let page = Page::new(vec![1, 2, 3, 4], PageRequest::new(0, 2), 4);
        assert_eq!(page.content, vec![1, 2]);
        assert_eq!(page.total_elements, 4);
    }

    #[test]
    fn test_empty_page_keeps_request_metadata() {
        let page: Page<Signal> = Page::empty(PageRequest::new(2, 10));
        assert!(page.is_empty());
        assert_eq!(page.page_index, 2);
        assert_eq!(page.page_size, 10);
        assert_eq!(page.total_elements, 0);
    }

    #[test]
    fn test_signal_serializes_camel_case() {
        let signal = Signal {
            id: 7,
            patient_id: 42,
            heartbeat: 80.0,
            pulse: 70.0,
            timestamp: ts(14, 30, 0),
            ecg_samples: vec![0.1, 0.2],
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["patientId"], 42);
        assert_eq!(json["ecgSamples"][1], 0.2);
        assert_eq!(json["timestamp"], "2025-11-09T14:30:00");
    }
}
