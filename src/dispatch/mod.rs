//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Caller dialect handler
//!     → context.rs (ModelMap resolves the model, CallContext fixes the deadline)
//!     → dispatcher.rs (admission mode chosen once from the rate limits)
//!         → load_balancer (acquire / next_eligible)
//!         → upstream (one POST per attempt)
//!         → resilience (classify, back off, penalize)
//!     → usage (synthesized completion metrics)
//!     → DispatchOutcome or RelayError
//! ```
//!
//! # Design Decisions
//! - The pool is passed in explicitly; there is no global state
//! - Admission failure in rate-limited mode is terminal (explicit backpressure)
//! - Failover backoff is linear; rate-limited backoff is exponential

pub mod admission;
pub mod context;
pub mod dispatcher;

pub use admission::{AdmissionMode, DispatchSettings};
pub use context::{CallContext, ModelMap};
pub use dispatcher::{DispatchOutcome, Dispatcher};
