//! Domain error types
//!
//! Raised when a raw string or number cannot become a domain value.

use thiserror::Error;

/// Rejection of a value at a domain boundary
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Session, user or event identifier that does not parse
    #[error("Malformed identifier: {0}")]
    InvalidId(String),

    #[error("Unknown log level '{0}'")]
    InvalidLogLevel(String),

    #[error("Unknown severity '{0}'")]
    InvalidSeverity(String),

    /// Event name was empty or otherwise unusable
    #[error("Unusable event name '{0}'")]
    InvalidEventName(String),

    #[error("Rejected value: {0}")]
    ValidationFailed(String),
}
