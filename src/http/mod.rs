//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit)
//!     → ollama.rs (parse dialect, resolve model)
//!     → [dispatcher admits and calls upstream]
//!     → ollama.rs (render reply with synthesized metrics)
//!     → response.rs (errors as status + JSON body)
//! ```

pub mod ollama;
pub mod response;
pub mod server;

pub use response::{ApiError, ErrorBody};
pub use server::{AppState, HttpServer};
