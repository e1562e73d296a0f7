//! Request handling.
//!
//! # Responsibilities
//! - Attach a unique request ID (UUID v4) and echo it on the response
//! - Resolve the client IP the rate limiter keys on
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Forwarded headers are ignored unless explicitly trusted; a client could
//!   otherwise pick a fresh IP per request and dodge the limiter

use axum::http::{HeaderMap, HeaderName};
use std::net::{IpAddr, SocketAddr};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Request ID set by [`set_request_id_layer`], or "unknown".
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// The IP a request is attributed to.
///
/// With `trust_forwarded` the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Anything unparsable falls back to the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> IpAddr {
    let peer_ip = peer
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));

    if !trust_forwarded {
        return peer_ip;
    }

    let forwarded = headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| {
            headers
                .get(&X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(peer_ip)
}
