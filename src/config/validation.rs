//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits, windows and timeouts > 0 and below their caps)
//! - Check addresses, media type and origins parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderValue;
use std::net::SocketAddr;

use crate::config::schema::GateConfig;
use crate::http::server::HEALTH_PATH;

/// Longest accepted rate limit window (30 days).
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;
/// Longest accepted wait on the counter store.
pub const MAX_STORE_TIMEOUT_MS: u64 = 60_000;
/// Longest accepted sweep interval and request deadline (1 day).
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("{field} is not a valid socket address: {value}")]
    Address { field: &'static str, value: String },

    #[error("content_type.allowed must look like type/subtype, got {0:?}")]
    MediaType(String),

    #[error("listener.ingest_path must start with '/' and not be /health, got {0:?}")]
    IngestPath(String),

    #[error("auth is enabled but auth.keys is empty")]
    NoApiKeys,

    #[error("auth.header is not a valid header name: {0:?}")]
    AuthHeader(String),

    #[error("cors.allowed_origins contains an invalid origin: {0:?}")]
    Origin(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if !config.listener.ingest_path.starts_with('/') || config.listener.ingest_path == HEALTH_PATH {
        errors.push(ValidationError::IngestPath(config.listener.ingest_path.clone()));
    }

    let rl = &config.rate_limit;
    for (field, value) in [
        ("rate_limit.capacity", rl.capacity),
        ("rate_limit.window_secs", rl.window_secs),
        ("rate_limit.store_timeout_ms", rl.store_timeout_ms),
        ("rate_limit.sweep_interval_secs", rl.sweep_interval_secs),
        ("limits.max_body_bytes", config.limits.max_body_bytes),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    for (field, value, max) in [
        ("rate_limit.window_secs", rl.window_secs, MAX_WINDOW_SECS),
        ("rate_limit.store_timeout_ms", rl.store_timeout_ms, MAX_STORE_TIMEOUT_MS),
        ("rate_limit.sweep_interval_secs", rl.sweep_interval_secs, MAX_INTERVAL_SECS),
        ("timeouts.request_secs", config.timeouts.request_secs, MAX_INTERVAL_SECS),
    ] {
        if value > max {
            errors.push(ValidationError::TooLarge { field, max });
        }
    }

    if !is_media_type(&config.content_type.allowed) {
        errors.push(ValidationError::MediaType(config.content_type.allowed.clone()));
    }

    if config.auth.enabled && config.auth.keys.is_empty() {
        errors.push(ValidationError::NoApiKeys);
    }
    if axum::http::HeaderName::from_bytes(config.auth.header.as_bytes()).is_err() {
        errors.push(ValidationError::AuthHeader(config.auth.header.clone()));
    }

    for origin in &config.cors.allowed_origins {
        if origin == "*" || HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::Origin(origin.clone()));
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field,
            value: value.to_string(),
        });
    }
}

fn is_media_type(value: &str) -> bool {
    let mut parts = value.split('/');
    let valid_token = |s: &str| {
        !s.is_empty()
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
    };
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(ty), Some(sub), None) if valid_token(ty) && valid_token(sub)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ApiKeyConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GateConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GateConfig::default();
        config.rate_limit.capacity = 0;
        config.limits.max_body_bytes = 0;
        config.content_type.allowed = "json".into();
        config.listener.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero { field: "rate_limit.capacity" }));
        assert!(errors.contains(&ValidationError::MediaType("json".into())));
    }

    #[test]
    fn test_auth_needs_keys() {
        let mut config = GateConfig::default();
        config.auth.enabled = true;
        assert_eq!(validate_config(&config), Err(vec![ValidationError::NoApiKeys]));

        config.auth.keys.push(ApiKeyConfig {
            key: "k".into(),
            client: "c".into(),
        });
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_ingest_path_cannot_shadow_health() {
        let mut config = GateConfig::default();
        config.listener.ingest_path = "/health".into();
        assert!(validate_config(&config).is_err());

        config.listener.ingest_path = "log".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_durations_are_capped() {
        let mut config = GateConfig::default();
        config.rate_limit.window_secs = i64::MAX as u64;
        config.rate_limit.store_timeout_ms = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::TooLarge {
                    field: "rate_limit.window_secs",
                    max: MAX_WINDOW_SECS
                },
                ValidationError::TooLarge {
                    field: "rate_limit.store_timeout_ms",
                    max: MAX_STORE_TIMEOUT_MS
                },
            ]
        );

        config.rate_limit.window_secs = MAX_WINDOW_SECS;
        config.rate_limit.store_timeout_ms = MAX_STORE_TIMEOUT_MS;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_media_type_shapes() {
        assert!(is_media_type("application/json"));
        assert!(is_media_type("application/vnd.api+json"));
        assert!(!is_media_type("application/"));
        assert!(!is_media_type("a/b/c"));
        assert!(!is_media_type("application/json; charset=utf-8"));
    }
}
