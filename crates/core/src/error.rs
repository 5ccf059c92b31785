//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
