//! Error types for the dispatch engine.

use courier_core::{ApiError, BoxError, UpdateType};
use thiserror::Error;

/// Errors that can occur while extracting handler parameters.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The event is not of the payload type the handler asked for.
    #[error("event type mismatch: expected '{expected}', got '{got}'")]
    EventTypeMismatch {
        /// Expected payload type name.
        expected: &'static str,
        /// Update kind of the dispatched event.
        got: UpdateType,
    },

    /// The event carries no conversation identity, so there is no context.
    #[error("event has no conversation context")]
    MissingContext,

    /// No client is bound yet; readiness has not run.
    #[error("no client is bound to the dispatcher")]
    ClientNotBound,

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// The error returned by [`Dispatcher::dispatch`](crate::Dispatcher::dispatch).
///
/// Nothing is caught or retried inside the pipeline; every failure surfaces
/// here with the stage it came from.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A base or handler filter failed.
    #[error("filter failed: {0}")]
    Filter(#[source] BoxError),

    /// A handler parameter could not be extracted.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// A middleware returned an error of its own.
    #[error("middleware failed: {0}")]
    Middleware(#[source] BoxError),
}

impl DispatchError {
    /// Recovers a `DispatchError` that travelled through the middleware chain
    /// as a [`BoxError`]. Anything else was raised by a middleware itself.
    pub(crate) fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(err) => *err,
            Err(err) => Self::Middleware(err),
        }
    }
}

/// Errors that abort readiness.
#[derive(Debug, Error)]
pub enum ReadyError {
    /// The self-identification call failed; the bot cannot run without it.
    #[error("failed to identify the bot: {0}")]
    Identify(#[source] ApiError),
}
