//! Consent ingestion handler, invoked only for admitted requests.

use axum::http::{HeaderMap, HeaderName};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::consent::event::ConsentEvent;
use crate::http::response::ApiError;
use crate::security::Admitted;

/// Body of a successful ingest.
#[derive(Debug, Serialize)]
pub struct Accepted {
    pub success: bool,
    pub event_id: Uuid,
    pub client: Option<String>,
}

pub struct ConsentHandler {
    auth_enabled: bool,
    key_header: HeaderName,
    /// API key → client name.
    clients: HashMap<String, String>,
}

impl ConsentHandler {
    pub fn new(config: &AuthConfig) -> Self {
        let key_header = HeaderName::from_bytes(config.header.as_bytes())
            .unwrap_or(HeaderName::from_static("x-api-key"));
        let clients = config
            .keys
            .iter()
            .map(|k| (k.key.clone(), k.client.clone()))
            .collect();

        Self {
            auth_enabled: config.enabled,
            key_header,
            clients,
        }
    }

    /// Resolve the caller's client name. `Ok(None)` when auth is off.
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
        if !self.auth_enabled {
            return Ok(None);
        }
        headers
            .get(&self.key_header)
            .and_then(|v| v.to_str().ok())
            .and_then(|key| self.clients.get(key.trim()))
            .map(|client| Some(client.clone()))
            .ok_or(ApiError::Unauthorized)
    }

    pub fn handle(&self, headers: &HeaderMap, request: Admitted) -> Result<Accepted, ApiError> {
        let client = self.authenticate(headers).inspect_err(|_| {
            tracing::warn!(source_ip = %request.metadata.source_ip, "API key rejected");
        })?;
        let event = ConsentEvent::parse(&request.body)?;
        let event_id = Uuid::new_v4();

        tracing::info!(
            %event_id,
            event_type = event.event_type(),
            client = client.as_deref().unwrap_or("-"),
            source_ip = %request.metadata.source_ip,
            bytes = request.body.len(),
            "Consent event accepted"
        );

        Ok(Accepted {
            success: true,
            event_id,
            client,
        })
    }
}
