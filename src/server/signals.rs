//! Signal upload and query endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::ingest::Transport;
use crate::storage::{Page, PageRequest, PatientId, Signal};

use super::AppState;
use super::response::{ApiError, ApiResponse};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters; `page` and `size` are accepted as aliases.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default, alias = "page")]
    pub page_index: Option<u32>,
    #[serde(default, alias = "size")]
    pub page_size: Option<u32>,
}

impl PageParams {
    fn to_request(&self) -> Result<PageRequest, ApiError> {
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::Validation(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        Ok(PageRequest::new(self.page_index.unwrap_or(0), page_size))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
    // Not flattened: urlencoded values only reach nested structs as strings.
    #[serde(default, alias = "page")]
    pub page_index: Option<u32>,
    #[serde(default, alias = "size")]
    pub page_size: Option<u32>,
}

impl RangeParams {
    fn page(&self) -> PageParams {
        PageParams {
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
fn parse_timestamp(field: &str, value: Option<&str>) -> Result<NaiveDateTime, ApiError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{field} is required")))?;

    value
        .parse::<NaiveDateTime>()
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.naive_utc()))
        .map_err(|_| {
            ApiError::Validation(format!(
                "{field} must be an ISO-8601 timestamp like 2025-11-09T14:30:00, got '{value}'"
            ))
        })
}

fn patient_id(path: Result<Path<PatientId>, PathRejection>) -> Result<PatientId, ApiError> {
    let Path(id) = path.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if id <= 0 {
        return Err(ApiError::Validation(format!(
            "patientId must be a positive whole number, got {id}"
        )));
    }
    Ok(id)
}

/// `POST /api/v1/icu/upload`
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<ApiResponse<()>, ApiError> {
    let accepted = state.pipeline.ingest_bytes(&body, Transport::Upload).await?;
    tracing::debug!(patient_id = accepted.patient_id, "Upload accepted");
    Ok(ApiResponse::ok_empty("Data received successfully"))
}

/// `GET /api/v1/icu/range/{patient_id}`
pub async fn range_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<PatientId>, PathRejection>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<ApiResponse<Page<Signal>>, ApiError> {
    let patient_id = patient_id(path)?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let start = parse_timestamp("start", params.start.as_deref())?;
    let end = parse_timestamp("end", params.end.as_deref())?;
    if start > end {
        return Err(ApiError::Validation(format!(
            "start ({start}) must not be after end ({end})"
        )));
    }
    let request = params.page().to_request()?;

    let page = state
        .queries
        .find_by_range(patient_id, start, end, request)
        .await;
    Ok(ApiResponse::ok("Fetched ICU signals in time range", page))
}

/// `GET /api/v1/icu/latest/{patient_id}`
pub async fn latest_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<PatientId>, PathRejection>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<ApiResponse<Page<Signal>>, ApiError> {
    let patient_id = patient_id(path)?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = params.to_request()?;

    let page = state.queries.find_latest(patient_id, request).await;
    Ok(ApiResponse::ok("Fetched latest ICU signals", page))
}
