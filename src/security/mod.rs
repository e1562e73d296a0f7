//! Security subsystem: the admission guards in front of the consent handler.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → content_type.rs (media type header, no body access)
//!     → limits.rs (declared length, then bounded streaming read)
//!     → rate_limit.rs (per-IP admission against store.rs)
//!     → chain.rs hands the buffered body to the handler
//! ```
//!
//! # Design Decisions
//! - Every guard implements [`Guard`]; the chain is an ordered list of them
//! - Cheap header checks run before the body is touched
//! - The rate limiter runs last so rejected requests never spend budget
//! - Malformed input inside a guard is that guard's rejection, never a fault

pub mod chain;
pub mod content_type;
pub mod limits;
pub mod rate_limit;
pub mod store;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use futures_util::future::BoxFuture;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

pub use chain::{Admitted, GuardChain};
pub use content_type::ContentTypeGuard;
pub use limits::SizeGuard;
pub use rate_limit::{Admission, RateLimitGuard, RateLimiter};
pub use store::{CounterStore, MemoryStore, StoreError};

/// A check that can veto a request before it reaches business logic.
pub trait Guard: Send + Sync {
    /// Short identifier used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Decide on a request. Guards may consume the body but must then store
    /// it back through [`GuardedRequest::set_body`].
    fn evaluate<'a>(&'a self, request: &'a mut GuardedRequest) -> BoxFuture<'a, GuardDecision>;
}

/// Outcome of a single guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Reject(Rejection),
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Content-Type must be {expected}")]
    ContentType {
        expected: String,
        received: Option<String>,
    },

    #[error("request body exceeds {limit} bytes")]
    Size { limit: u64, observed: SizeObservation },

    #[error("{0}")]
    Rate(RateRejection),
}

/// How an oversized body was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeObservation {
    /// `Content-Length` alone exceeded the limit; nothing was read.
    Declared(u64),
    /// Streaming read crossed the limit after this many bytes.
    Streamed(u64),
    /// `Content-Length` could not be parsed.
    MalformedLength,
    /// The body stream failed before it finished.
    ReadFailed,
}

/// Rate limiter refusal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateRejection {
    #[error("more than {limit} requests in the current window")]
    Exceeded { limit: u64, retry_after: Duration },

    #[error("rate limiter store is unavailable")]
    StoreUnavailable { retry_after: Duration },
}

impl Rejection {
    /// HTTP status the rejection is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::ContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::Size { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::Rate(RateRejection::Exceeded { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Rejection::Rate(RateRejection::StoreUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::ContentType { .. } => "unsupported_media_type",
            Rejection::Size { .. } => "payload_too_large",
            Rejection::Rate(RateRejection::Exceeded { .. }) => "rate_limited",
            Rejection::Rate(RateRejection::StoreUnavailable { .. }) => "rate_limiter_unavailable",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Rejection::Rate(RateRejection::Exceeded { retry_after, .. })
            | Rejection::Rate(RateRejection::StoreUnavailable { retry_after }) => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

/// `Content-Length` as the client declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredLength {
    Absent,
    Bytes(u64),
    Malformed,
}

impl DeclaredLength {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(header::CONTENT_LENGTH) {
            None => DeclaredLength::Absent,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map_or(DeclaredLength::Malformed, DeclaredLength::Bytes),
        }
    }
}

/// What the guards know about a request.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub content_type: Option<HeaderValue>,
    pub declared_length: DeclaredLength,
    /// Set once the body has been read.
    pub bytes_read: Option<u64>,
    pub source_ip: IpAddr,
    pub received_at: SystemTime,
}

impl RequestMetadata {
    pub fn from_headers(headers: &HeaderMap, source_ip: IpAddr, received_at: SystemTime) -> Self {
        Self {
            content_type: headers.get(header::CONTENT_TYPE).cloned(),
            declared_length: DeclaredLength::from_headers(headers),
            bytes_read: None,
            source_ip,
            received_at,
        }
    }
}

enum BodyState {
    Unread(Body),
    Read(Bytes),
    Taken,
}

/// A request travelling through the guard chain.
pub struct GuardedRequest {
    metadata: RequestMetadata,
    body: BodyState,
}

impl GuardedRequest {
    pub fn new(metadata: RequestMetadata, body: Body) -> Self {
        Self {
            metadata,
            body: BodyState::Unread(body),
        }
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// Take the body if no guard has read it yet.
    pub fn take_unread_body(&mut self) -> Option<Body> {
        match std::mem::replace(&mut self.body, BodyState::Taken) {
            BodyState::Unread(body) => Some(body),
            other => {
                self.body = other;
                None
            }
        }
    }

    /// Store a fully read body.
    pub fn set_body(&mut self, bytes: Bytes) {
        self.metadata.bytes_read = Some(bytes.len() as u64);
        self.body = BodyState::Read(bytes);
    }

    pub(crate) fn into_parts(self) -> (RequestMetadata, Option<Body>, Option<Bytes>) {
        match self.body {
            BodyState::Unread(body) => (self.metadata, Some(body), None),
            BodyState::Read(bytes) => (self.metadata, None, Some(bytes)),
            BodyState::Taken => (self.metadata, None, Some(Bytes::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(DeclaredLength::from_headers(&headers), DeclaredLength::Absent);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1024"));
        assert_eq!(DeclaredLength::from_headers(&headers), DeclaredLength::Bytes(1024));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(DeclaredLength::from_headers(&headers), DeclaredLength::Malformed);
    }

    #[test]
    fn test_rejection_status_codes() {
        let ct = Rejection::ContentType {
            expected: "application/json".into(),
            received: None,
        };
        assert_eq!(ct.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(ct.retry_after(), None);

        let size = Rejection::Size {
            limit: 10,
            observed: SizeObservation::Declared(11),
        };
        assert_eq!(size.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let rate = Rejection::Rate(RateRejection::Exceeded {
            limit: 10,
            retry_after: Duration::from_secs(3),
        });
        assert_eq!(rate.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rate.code(), "rate_limited");
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(3)));

        let down = Rejection::Rate(RateRejection::StoreUnavailable {
            retry_after: Duration::from_secs(1),
        });
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
