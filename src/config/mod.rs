//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → handed to the server, which builds the guard chain from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults except the rate-limit window
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ApiKeyConfig, AuthConfig, ContentTypeConfig, CorsConfig, FailurePolicy, GateConfig,
    LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig,
    TimeoutConfig, WindowStrategy,
};
pub use validation::{validate_config, ValidationError};
