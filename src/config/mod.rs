//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + KEY_RELAY_API_KEYS
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → split into DispatchSettings / Pool / HTTP state at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the credential pool lives for the process
//! - All fields have defaults to allow minimal configs
//! - Admission mode is derived from the rate limits, never configured directly

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, FailoverConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RateLimitConfig, RelayConfig, RetryConfig, UpstreamConfig, UsageConfig,
};
