//! LLM key relay library.
//!
//! Accepts Ollama-style chat and generate calls, admits each one to a
//! credential from the pool, and fails over across credentials when the
//! upstream refuses.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod http;
pub mod upstream;

// Credential management
pub mod load_balancer;
pub mod resilience;
pub mod usage;

// Cross-cutting concerns
pub mod admin;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use dispatch::Dispatcher;
pub use error::{RelayError, RelayResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
