//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.
//!
//! Every section has defaults except `[rate_limit]`, whose `window_secs`
//! must be stated explicitly in a config file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the admission gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Listener configuration (bind address, ingest route).
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Per-IP rate limiting. Required in config files.
    pub rate_limit: RateLimitConfig,

    /// Body size limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Accepted media type.
    #[serde(default)]
    pub content_type: ContentTypeConfig,

    /// API key check performed by the consent handler.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Cross-origin policy for browser callers.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            rate_limit: RateLimitConfig::with_window(60),
            limits: LimitsConfig::default(),
            content_type: ContentTypeConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path that accepts consent events.
    pub ingest_path: String,

    /// Prefer `X-Forwarded-For` / `X-Real-IP` over the socket peer address.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            ingest_path: "/".to_string(),
            trust_forwarded_headers: false,
        }
    }
}

/// How request counts are bounded over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// Window anchored at the first request from an IP; resets when it ends.
    Fixed,
    /// Weighted estimate over the current and previous epoch-aligned windows.
    Sliding,
}

/// What the limiter does when its backing store errors or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request.
    FailOpen,
    /// Reject the request with 503.
    FailClosed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per IP within one window.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Window length in seconds. No default.
    pub window_secs: u64,

    /// Fixed or sliding window.
    #[serde(default = "default_strategy")]
    pub strategy: WindowStrategy,

    /// Behaviour on store failure.
    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,

    /// Deadline for a single store operation in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Interval between expired-bucket sweeps in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> u64 {
    10
}

fn default_strategy() -> WindowStrategy {
    WindowStrategy::Fixed
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::FailClosed
}

fn default_store_timeout_ms() -> u64 {
    50
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl RateLimitConfig {
    /// Defaults for everything but the window, which the caller picks.
    pub fn with_window(window_secs: u64) -> Self {
        Self {
            enabled: default_true(),
            capacity: default_capacity(),
            window_secs,
            strategy: default_strategy(),
            failure_policy: default_failure_policy(),
            store_timeout_ms: default_store_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Request body limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes (inclusive).
    pub max_body_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 50 * 1024,
        }
    }
}

/// Media type enforcement.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContentTypeConfig {
    /// The only media type accepted, compared case-insensitively without parameters.
    pub allowed: String,
}

impl Default for ContentTypeConfig {
    fn default() -> Self {
        Self {
            allowed: "application/json".to_string(),
        }
    }
}

/// A caller key and the client it identifies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub client: String,
}

/// API key check.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require a known key on every ingest request.
    pub enabled: bool,

    /// Header carrying the key.
    pub header: String,

    /// Accepted keys.
    pub keys: Vec<ApiKeyConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: "x-api-key".to_string(),
            keys: Vec::new(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty mirrors the request origin.
    pub allowed_origins: Vec<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request deadline in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 10 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
