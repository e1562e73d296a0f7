//! Media type enforcement.
//!
//! Only the configured type (default `application/json`) is accepted. The
//! comparison ignores ASCII case and any `;` parameters, so
//! `Application/JSON; charset=utf-8` passes while `application/json-seq`
//! does not. Absent or non-visible-ASCII headers are rejected.

use axum::http::HeaderValue;
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::config::ContentTypeConfig;
use crate::security::{Guard, GuardDecision, GuardedRequest, Rejection};

pub struct ContentTypeGuard {
    allowed: String,
}

impl ContentTypeGuard {
    pub fn new(config: &ContentTypeConfig) -> Self {
        Self {
            allowed: config.allowed.trim().to_ascii_lowercase(),
        }
    }

    /// Pure header check.
    pub fn check(&self, header: Option<&HeaderValue>) -> GuardDecision {
        let received = header.map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        let matches = header
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim())
            .is_some_and(|essence| essence.eq_ignore_ascii_case(&self.allowed));

        if matches {
            GuardDecision::Allow
        } else {
            GuardDecision::Reject(Rejection::ContentType {
                expected: self.allowed.clone(),
                received,
            })
        }
    }
}

impl Guard for ContentTypeGuard {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn evaluate<'a>(&'a self, request: &'a mut GuardedRequest) -> BoxFuture<'a, GuardDecision> {
        future::ready(self.check(request.metadata().content_type.as_ref())).boxed()
    }
}
