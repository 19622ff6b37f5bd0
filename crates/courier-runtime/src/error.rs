//! Runtime error types.

use courier_core::TransportError;
use courier_framework::ReadyError;
use thiserror::Error;

pub use crate::config::error::{ConfigError, ConfigResult};

/// Errors that stop the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Readiness failed before the first update.
    #[error("dispatcher is not ready: {0}")]
    Ready(#[from] ReadyError),

    /// The update source failed in a way that cannot be retried.
    #[error("update source failed: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
