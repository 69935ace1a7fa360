//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher attempt (backend credential + ChatRequest)
//!     → client.rs (POST {base_url}/chat/completions, bearer credential)
//!     → 2xx: types.rs parses ChatCompletion
//!     → otherwise: UpstreamError (status/body, timeout, transport)
//! ```
//!
//! # Design Decisions
//! - One HTTP request per attempt, never streamed
//! - Timeout applied by the client, not by the dispatcher
//! - Classification of failures lives in resilience, not here

pub mod client;
pub mod types;

pub use client::{HttpUpstream, UpstreamClient};
pub use types::{ChatCompletion, ChatMessage, ChatRequest, UpstreamError};
