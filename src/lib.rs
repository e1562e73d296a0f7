//! Admission control gate for consent event ingestion.

pub mod config;
pub mod consent;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::GateConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownListener};
