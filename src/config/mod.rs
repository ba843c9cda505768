//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated)
//!     → seeds AppState: allow-list, rate limit config, upstream client
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Allow-list and rate limit settings are only initial values; the admin
//!   API mutates the live copies held by the security subsystem

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, RateLimitConfig,
    SecurityConfig, UpstreamConfig,
};
pub use validation::ValidationError;
