use crate::error::Error;
use crate::runner::Pipeline;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::NaiveDate;
use log::{error, info};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_DATE: &str = "2024-05-01";
pub const COMPLETE_STATUS: &str = "Data processing complete.";

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct StatusPayload {
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillParams {
    pub start_date: String,
    pub end_date: String,
}

impl Default for BackfillParams {
    fn default() -> Self {
        BackfillParams {
            start_date: DEFAULT_DATE.to_string(),
            end_date: DEFAULT_DATE.to_string(),
        }
    }
}

impl BackfillParams {
    /// Reads the dates from a request, looking at the body only when it is sent as JSON.
    pub fn from_request(headers: &HeaderMap, body: &[u8]) -> Self {
        if is_json(headers) {
            Self::from_body(body)
        } else {
            Self::default()
        }
    }

    /// Reads `start_date`/`end_date` from a request body. An empty or unparsable body, or a
    /// field that is missing or not a string, falls back to the default date.
    pub fn from_body(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_DATE)
                .to_string()
        };

        BackfillParams {
            start_date: field("start_date"),
            end_date: field("end_date"),
        }
    }
}

/// `application/json` or any `application/*+json` media type.
fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidDate {
        date: s.to_string(),
    })
}

/// Runs the pipeline over the requested range. Only malformed dates are reported as errors;
/// per-day failures end up in the log, not in the returned payload.
pub async fn backfill(pipeline: &Pipeline, params: &BackfillParams) -> Result<StatusPayload, Error> {
    let start = parse_date(&params.start_date)?;
    let end = parse_date(&params.end_date)?;

    info!("Processing data from {} to {}", start, end);
    pipeline.run(start, end).await;

    Ok(StatusPayload {
        status: COMPLETE_STATUS,
    })
}

/// Every path and method reaches the trigger. Request size is left to the hosting platform.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .fallback(handle_backfill)
        .layer(DefaultBodyLimit::disable())
        .with_state(pipeline)
}

async fn handle_backfill(
    State(pipeline): State<Arc<Pipeline>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = BackfillParams::from_request(&headers, &body);

    match backfill(&pipeline, &params).await {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => {
            error!("Rejected backfill request: {}", err);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
