//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Rate limiter call to the counter store:
//!     → timeouts.rs (enforce store deadline)
//!     → On timeout or error: the limiter's failure policy decides
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every store call has a deadline
//! - No retries: a late admission decision is worse than a policy decision

pub mod timeouts;
