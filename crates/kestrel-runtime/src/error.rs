//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use kestrel_core::{BanListError, TransportError};

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A transport could not be constructed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The ban list could not be read.
    #[error("Ban list error: {0}")]
    BanList(#[from] BanListError),

    /// Signal registration or other I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
