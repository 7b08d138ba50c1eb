//! Error types for the telemetry runtime
//!
//! These errors never escape the public capture/record paths; they are
//! logged and swallowed there. They surface only from the lower-level
//! building blocks (transport, storage) for callers that want them.

use thiserror::Error;

/// Errors raised while delivering a batch to the backend
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or timed out
    #[error("Request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}

/// Errors raised by the key/value storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document is not valid JSON
    #[error("Corrupt storage document: {0}")]
    Corrupt(#[from] serde_json::Error),
}
