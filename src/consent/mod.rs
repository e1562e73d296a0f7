//! Consent logging endpoint.
//!
//! # Data Flow
//! ```text
//! Admitted request (all guards passed)
//!     → handler.rs (API key → client name)
//!     → event.rs (JSON object with event_type and cookie)
//!     → event ID assigned, event logged, 200
//! ```
//!
//! # Design Decisions
//! - Storage of events is not this crate's concern; accepted events are
//!   emitted as structured log records
//! - The key check sits behind the guards so floods are shed before any
//!   key lookup happens

pub mod event;
pub mod handler;

pub use event::ConsentEvent;
pub use handler::{Accepted, ConsentHandler};
