//! Request body size limits.
//!
//! # Responsibilities
//! - Reject a declared `Content-Length` above the ceiling without reading
//! - Enforce the same ceiling while streaming, whatever was declared
//! - Hand the buffered body on to the rest of the chain
//!
//! # Design Decisions
//! - The client-declared length is never trusted on its own
//! - Buffered bytes never exceed the ceiling. Of the chunk that crosses it
//!   only `ceiling + 1` bytes in total are taken; the rest is dropped unread
//!   along with the stream
//! - Return 413 Payload Too Large, which also closes the connection

use axum::body::{Body, Bytes};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;

use crate::security::{
    DeclaredLength, Guard, GuardDecision, GuardedRequest, Rejection, SizeObservation,
};

pub struct SizeGuard {
    max_body_bytes: u64,
}

impl SizeGuard {
    pub fn new(max_body_bytes: u64) -> Self {
        Self { max_body_bytes }
    }

    pub fn limit(&self) -> u64 {
        self.max_body_bytes
    }

    /// Header-only check on the declared length.
    pub fn check_declared(&self, declared: DeclaredLength) -> GuardDecision {
        match declared {
            DeclaredLength::Bytes(n) if n > self.max_body_bytes => {
                self.reject(SizeObservation::Declared(n))
            }
            DeclaredLength::Malformed => self.reject(SizeObservation::MalformedLength),
            _ => GuardDecision::Allow,
        }
    }

    /// Read the body, giving up as soon as it grows past the ceiling.
    pub async fn read_bounded(&self, body: Body) -> Result<Bytes, Rejection> {
        let limit = self.max_body_bytes;
        let mut stream = body.into_data_stream();
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::debug!(error = %e, "Body stream failed during size check");
                self.rejection(SizeObservation::ReadFailed)
            })?;

            let room = limit - buf.len() as u64;
            if chunk.len() as u64 > room {
                let taken = buf.len() as u64 + room + 1;
                drop(stream);
                return Err(self.rejection(SizeObservation::Streamed(taken)));
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(Bytes::from(buf))
    }

    fn rejection(&self, observed: SizeObservation) -> Rejection {
        Rejection::Size {
            limit: self.max_body_bytes,
            observed,
        }
    }

    fn reject(&self, observed: SizeObservation) -> GuardDecision {
        GuardDecision::Reject(self.rejection(observed))
    }
}

impl Guard for SizeGuard {
    fn name(&self) -> &'static str {
        "size"
    }

    fn evaluate<'a>(&'a self, request: &'a mut GuardedRequest) -> BoxFuture<'a, GuardDecision> {
        async move {
            let decision = self.check_declared(request.metadata().declared_length);
            if decision != GuardDecision::Allow {
                return decision;
            }

            let Some(body) = request.take_unread_body() else {
                return GuardDecision::Allow;
            };

            match self.read_bounded(body).await {
                Ok(bytes) => {
                    request.set_body(bytes);
                    GuardDecision::Allow
                }
                Err(rejection) => GuardDecision::Reject(rejection),
            }
        }
        .boxed()
    }
}
