//! Common error types for the archive vault

use thiserror::Error;

/// Common result type for archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the archive crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No identity session has been established yet
    #[error("No active session")]
    NoSession,

    /// File payload could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Identity provider or document store call failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
