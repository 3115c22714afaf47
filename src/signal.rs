//! Signal payload decoding and validation.
//!
//! Decoding and validation are separate steps with separate error kinds:
//! a payload that cannot be parsed is a [`serde_json::Error`], a payload that
//! parses but breaks a constraint is a [`ValidationError`].
//!
//! Constraints are checked in a fixed order and the first violation wins:
//!
//! 1. `patientId` present and a positive whole number
//! 2. `heartbeat`, then `pulse`, present and finite
//! 3. every `ecgSamples` entry finite

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::{PatientId, Signal};

/// Decoded, not yet validated, wire payload.
///
/// Every field is optional so that "missing" is reported as a validation
/// failure rather than a parse failure. Any client-supplied `timestamp` is
/// ignored. `nationalId` and `ecgList` are accepted from older devices.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    #[serde(default, alias = "nationalId")]
    pub patient_id: Option<serde_json::Number>,
    #[serde(default)]
    pub heartbeat: Option<f64>,
    #[serde(default)]
    pub pulse: Option<f64>,
    #[serde(default, alias = "ecgList")]
    pub ecg_samples: Option<Vec<f64>>,
}

impl SignalPayload {
    /// Parse a UTF-8 JSON object.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// The first violated constraint of a well-formed payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("patientId is required")]
    MissingPatientId,

    #[error("patientId must be a positive whole number, got {0}")]
    InvalidPatientId(String),

    #[error("{0} is required")]
    MissingReading(&'static str),

    #[error("{0} must be a finite number")]
    NonFiniteReading(&'static str),

    #[error("ecgSamples[{0}] must be a finite number")]
    NonFiniteEcgSample(usize),
}

/// A payload that passed validation and is waiting for its server timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSignal {
    pub patient_id: PatientId,
    pub heartbeat: f64,
    pub pulse: f64,
    pub ecg_samples: Vec<f64>,
}

impl ValidSignal {
    /// Stamp with the acceptance time. The store assigns the id later.
    pub fn accept_at(self, timestamp: NaiveDateTime) -> Signal {
        Signal {
            id: 0,
            patient_id: self.patient_id,
            heartbeat: self.heartbeat,
            pulse: self.pulse,
            timestamp,
            ecg_samples: self.ecg_samples,
        }
    }
}

/// Validate a decoded payload.
pub fn validate(payload: SignalPayload) -> Result<ValidSignal, ValidationError> {
    let patient_id = payload
        .patient_id
        .as_ref()
        .ok_or(ValidationError::MissingPatientId)
        .and_then(parse_patient_id)?;

    let heartbeat = finite_reading("heartbeat", payload.heartbeat)?;
    let pulse = finite_reading("pulse", payload.pulse)?;

    let ecg_samples = payload.ecg_samples.unwrap_or_default();
    if let Some(index) = ecg_samples.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::NonFiniteEcgSample(index));
    }

    Ok(ValidSignal {
        patient_id,
        heartbeat,
        pulse,
        ecg_samples,
    })
}

fn parse_patient_id(n: &serde_json::Number) -> Result<PatientId, ValidationError> {
    let whole = n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    });

    match whole {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidPatientId(n.to_string())),
    }
}

fn finite_reading(field: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    match value {
        None => Err(ValidationError::MissingReading(field)),
        Some(v) if !v.is_finite() => Err(ValidationError::NonFiniteReading(field)),
        Some(v) => Ok(v),
    }
}
