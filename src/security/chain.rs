//! Ordered guard evaluation.
//!
//! The chain runs its guards in list order and stops at the first rejection.
//! [`GuardChain::from_config`] builds the standard order: content type, size,
//! rate limit. Header-only checks come first, the body is read next, and the
//! stateful limiter only sees requests that survived both.

use axum::body::Bytes;
use std::sync::Arc;

use crate::config::GateConfig;
use crate::observability::metrics;
use crate::security::content_type::ContentTypeGuard;
use crate::security::limits::SizeGuard;
use crate::security::rate_limit::{RateLimitGuard, RateLimiter};
use crate::security::store::CounterStore;
use crate::security::{Guard, GuardDecision, GuardedRequest, Rejection, RequestMetadata};

/// A request every guard allowed.
#[derive(Debug)]
pub struct Admitted {
    pub metadata: RequestMetadata,
    pub body: Bytes,
}

pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
    max_body_bytes: u64,
}

impl GuardChain {
    /// A chain over arbitrary guards. Bodies no guard reads are still capped
    /// at `max_body_bytes` when the request is admitted.
    pub fn new(guards: Vec<Box<dyn Guard>>, max_body_bytes: u64) -> Self {
        Self {
            guards,
            max_body_bytes,
        }
    }

    pub fn from_config(config: &GateConfig, store: Arc<dyn CounterStore>) -> Self {
        let mut guards: Vec<Box<dyn Guard>> = vec![
            Box::new(ContentTypeGuard::new(&config.content_type)),
            Box::new(SizeGuard::new(config.limits.max_body_bytes)),
        ];
        if config.rate_limit.enabled {
            let limiter = RateLimiter::new(store, &config.rate_limit);
            guards.push(Box::new(RateLimitGuard::new(limiter)));
        }
        Self::new(guards, config.limits.max_body_bytes)
    }

    pub fn guard_names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }

    /// Evaluate every guard in order; the first rejection wins.
    pub async fn run(&self, mut request: GuardedRequest) -> Result<Admitted, Rejection> {
        for guard in &self.guards {
            if let GuardDecision::Reject(rejection) = guard.evaluate(&mut request).await {
                metrics::record_rejection(guard.name(), rejection.code());
                tracing::warn!(
                    guard = guard.name(),
                    code = rejection.code(),
                    source_ip = %request.metadata().source_ip,
                    "Request rejected"
                );
                return Err(rejection);
            }
        }

        let (mut metadata, unread, read) = request.into_parts();
        let body = match (unread, read) {
            (_, Some(bytes)) => bytes,
            (Some(body), None) => {
                let bytes = SizeGuard::new(self.max_body_bytes).read_bounded(body).await?;
                metadata.bytes_read = Some(bytes.len() as u64);
                bytes
            }
            (None, None) => Bytes::new(),
        };

        Ok(Admitted { metadata, body })
    }
}
