//! Signer error types.

use thiserror::Error;

/// Token signing and verification errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid secret key: {0}")]
    InvalidKey(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("token expired")]
    Expired,

    #[error("token not valid for repository {0}")]
    RepositoryMismatch(String),

    #[error("token not valid for {0}")]
    OperationMismatch(String),
}

impl SignerError {
    /// Whether this error means the presented token must be refused
    /// (as opposed to a server-side failure).
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::InvalidKey(_) | Self::Signing(_))
    }
}

/// Result type for signer operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
