//! Consent event payload checks.
//!
//! Only the shape needed to accept an event is checked. Everything else in
//! the payload is passed through untouched.

use serde_json::{Map, Value};

use crate::http::response::ApiError;

/// Fields every consent event must carry.
pub const REQUIRED_FIELDS: [&str; 2] = ["event_type", "cookie"];

/// A parsed consent event.
#[derive(Debug, Clone)]
pub struct ConsentEvent {
    fields: Map<String, Value>,
}

impl ConsentEvent {
    /// Parse a JSON object and check the required fields are present and non-null.
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(ApiError::InvalidJson("top-level value is not an object".into()));
        };

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .into_iter()
            .filter(|field| fields.get(*field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::MissingFields(missing));
        }

        Ok(Self { fields })
    }

    /// `event_type` rendered for logs.
    pub fn event_type(&self) -> &str {
        self.fields
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
