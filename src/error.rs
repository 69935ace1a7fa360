//! Error taxonomy surfaced to callers.

use thiserror::Error;

use crate::upstream::UpstreamError;

/// Terminal outcome of a dispatch, or a startup failure.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Admission timed out, or the failover budget ran out without a concrete error.
    #[error("upstream capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// Retryable failures exhausted the attempt budget.
    #[error("upstream failed after {attempts} attempts: {source}")]
    UpstreamRetryable {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },

    /// Non-retryable upstream outcome.
    #[error("upstream rejected request: {0}")]
    UpstreamFatal(#[source] UpstreamError),

    /// Caller body could not be parsed; `status` is the client-error code to answer with.
    #[error("invalid request: {message}")]
    InvalidRequest { status: u16, message: String },

    /// Caller asked for a model the relay does not serve.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// The relay cannot run with its configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// HTTP status the caller should see.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::CapacityExhausted(_) => 429,
            RelayError::UpstreamRetryable { source, .. } => upstream_status(source),
            RelayError::UpstreamFatal(source) => upstream_status(source),
            RelayError::InvalidRequest { status, .. } => *status,
            RelayError::ModelNotFound(_) => 404,
            RelayError::Configuration(_) => 500,
        }
    }

    /// Upstream response body, when the failure carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RelayError::UpstreamRetryable { source, .. } | RelayError::UpstreamFatal(source) => {
                source.body()
            }
            _ => None,
        }
    }
}

fn upstream_status(err: &UpstreamError) -> u16 {
    match err {
        UpstreamError::Status { status, .. } => *status,
        UpstreamError::Timeout => 504,
        UpstreamError::Transport(_) | UpstreamError::InvalidBody(_) => 502,
    }
}
