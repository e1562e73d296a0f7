//! Error responses.
//!
//! # Responsibilities
//! - Map guard rejections and handler failures to precise status codes
//! - Render a machine-readable error descriptor
//!
//! # Design Decisions
//! - Every client-caused failure keeps its own 4xx; nothing becomes a bare 500
//! - Rate limit and store-unavailable responses carry `Retry-After`
//! - 413 responses carry `Connection: close`; whatever body the client is
//!   still sending is never read

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;

use crate::security::Rejection;

/// JSON body of every error the gate produces.
#[derive(Debug, Serialize)]
pub struct ErrorDescriptor {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Anything that stops a request short of a 200.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("missing or unknown API key")]
    Unauthorized,

    #[error("request body is not a JSON object: {0}")]
    InvalidJson(String),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(rejection) => rejection.status(),
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidJson(_) | ApiError::MissingFields(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Rejected(rejection) => rejection.code(),
            ApiError::Unauthorized => "unauthorized",
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::MissingFields(_) => "missing_fields",
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Rejected(rejection) => rejection.retry_after(),
            _ => None,
        }
    }
}

/// Whole seconds, rounded up and never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after().map(retry_after_secs);
        let body = ErrorDescriptor {
            error: self.code(),
            message: self.to_string(),
            retry_after_secs: retry_after,
        };

        let status = self.status();
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
