//! Token signing secret.

use crate::error::{SignerError, SignerResult};
use rand_core::RngCore;
use std::fmt;

/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Maximum secret length in bytes.
pub const MAX_SECRET_LEN: usize = 256;

/// Length of generated secrets in bytes.
const GENERATED_SECRET_LEN: usize = 32;

/// A server-wide HMAC secret.
#[derive(Clone)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Create from raw bytes, enforcing length bounds.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> SignerResult<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN || bytes.len() > MAX_SECRET_LEN {
            return Err(SignerError::InvalidKey(format!(
                "secret must be {MIN_SECRET_LEN}..={MAX_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Create from a configured string value. Surrounding whitespace
    /// (e.g. a trailing newline in a secrets file) is ignored.
    pub fn from_text(s: &str) -> SignerResult<Self> {
        Self::from_bytes(s.trim().as_bytes())
    }

    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_SECRET_LEN];
        rand_core::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}
