//! Error types shared across Courier crates.
//!
//! Framework-level errors (extraction, dispatch, readiness) live in
//! `courier-framework`; this module only covers the collaborators.

use thiserror::Error;

/// The error currency of handlers, filters and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// API Errors
// =============================================================================

/// Errors returned by [`Client`](crate::Client) calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No client is bound, or the client lost its connection.
    #[error("client is not connected")]
    NotConnected,
    /// The call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The platform rejected the call.
    #[error("API error ({code}): {message}")]
    Platform { code: i64, message: String },
    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The event carries neither a chat nor a user to reply to.
    #[error("event has no reply target")]
    MissingTarget,
    /// Transport failure underneath the call.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while fetching updates.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A fetch attempt failed; the source may be retried.
    #[error("failed to fetch updates: {0}")]
    Fetch(String),

    /// The source is closed and will not yield further updates.
    #[error("update source closed")]
    Closed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for client calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
