//! Error types for the Fedigate rate limiter.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Fedigate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule failed validation while loading
    #[error("Invalid rate limit rule '{key}': {reason}")]
    InvalidRule { key: String, reason: String },

    /// Request factor was negative, NaN or infinite
    #[error("Rate limit factor must be a finite, non-negative number (got {0})")]
    InvalidFactor(f64),

    /// No rule is registered under the given name
    #[error("Unknown rate limit rule: {0}")]
    UnknownRule(String),

    /// Counter store read failed
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// Counter store read did not complete in time
    #[error("Counter store timed out after {timeout_ms}ms reading '{key}'")]
    StoreTimeout { key: String, timeout_ms: u64 },
}

/// Result type alias for Fedigate operations.
pub type Result<T> = std::result::Result<T, GateError>;
