//! HTTP surface of the gate.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, ingest route)
//!     → request.rs (request ID, client IP)
//!     → security::GuardChain (content type → size → rate limit)
//!     → consent::ConsentHandler
//!     → response.rs (success body or error descriptor)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{client_ip, X_REQUEST_ID};
pub use response::{ApiError, ErrorDescriptor};
pub use server::{AppState, HttpServer, HEALTH_PATH};
