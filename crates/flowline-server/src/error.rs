//! Error types for the Flowline Server
//!
//! This module contains the error types used throughout the server.

use flowline_core::CoreError;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Error raised by the flow lifecycle services
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Listener or socket failure
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        ServerError::ConfigError(err.to_string())
    }
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
