//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("size mismatch: declared {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("staged object not found: {0}")]
    StagingMissing(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the error was caused by what the client sent rather than by
    /// the store itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SizeMismatch { .. } | Self::HashMismatch { .. } | Self::InvalidKey(_)
        )
    }

    pub(crate) fn not_found_or_io(key: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(key.to_string())
        } else {
            Self::Io(err)
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
