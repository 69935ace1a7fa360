//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, floors finite)
//! - Reject configs the relay cannot start with (no credentials)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no upstream credentials configured")]
    NoCredentials,

    #[error("credential #{0} is empty")]
    EmptyCredential(usize),

    #[error("invalid upstream base_url '{0}'")]
    InvalidBaseUrl(String),

    #[error("upstream timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("usage min_tokens_per_second must be a finite, non-negative number")]
    InvalidThroughputFloor,

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("admin is enabled but admin.api_key is empty")]
    MissingAdminKey,

    #[error("model mapping '{0}' has an empty upstream name")]
    EmptyModelMapping(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.api_keys.is_empty() {
        errors.push(ValidationError::NoCredentials);
    }
    for (i, key) in config.upstream.api_keys.iter().enumerate() {
        if key.trim().is_empty() {
            errors.push(ValidationError::EmptyCredential(i));
        }
    }

    if Url::parse(&config.upstream.base_url).is_err() {
        errors.push(ValidationError::InvalidBaseUrl(config.upstream.base_url.clone()));
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let floor = config.usage.min_tokens_per_second;
    if !floor.is_finite() || floor < 0.0 {
        errors.push(ValidationError::InvalidThroughputFloor);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    for (name, target) in &config.models {
        if target.trim().is_empty() {
            errors.push(ValidationError::EmptyModelMapping(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
