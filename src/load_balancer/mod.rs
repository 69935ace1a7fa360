//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher needs a credential
//!     → pool.rs (rotation order from the shared cursor)
//!     → round_robin.rs (cursor, advances once per rotation)
//!     → backend.rs (try_acquire / in_penalty per candidate)
//!     → Return backend or CapacityExhausted
//! ```
//!
//! # Design Decisions
//! - One pool per process, owned explicitly and shared via Arc
//! - The rotation cursor is the only fairness mechanism
//! - Rate-limited admission polls; failover admission never blocks
//! - Penalized backends are skipped, but failover never refuses outright

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::{Backend, BackendSnapshot};
pub use pool::Pool;
pub use round_robin::RoundRobin;
