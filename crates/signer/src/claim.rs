//! Token claims and their canonical encoding.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use lode_core::{Operation, RepoName};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Maximum encoded claim length accepted for decoding.
/// Bounds work done on attacker-supplied header values.
pub const MAX_ENCODED_CLAIM_LEN: usize = 4096;

/// What a token grants.
///
/// Field order is the serialization order, which makes the encoding
/// canonical: the same claim always produces the same bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Expiry as a Unix timestamp (seconds).
    #[serde(rename = "exp")]
    pub expires_at: i64,
    /// Repository the token is scoped to.
    pub repo: RepoName,
    /// Operation the token is scoped to. `None` grants both.
    #[serde(default, rename = "op", skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

impl Claim {
    /// Create a claim expiring at the given instant.
    pub fn new(repo: RepoName, operation: Option<Operation>, expires_at: OffsetDateTime) -> Self {
        Self {
            expires_at: expires_at.unix_timestamp(),
            repo,
            operation,
        }
    }

    /// Expiry as an `OffsetDateTime`.
    pub fn expires_at(&self) -> SignerResult<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.expires_at)
            .map_err(|e| SignerError::Malformed(format!("invalid expiry: {e}")))
    }

    /// Whether the claim has expired at `now`. A claim is still valid at the
    /// exact second it expires.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now.unix_timestamp()
    }

    /// Canonical claim bytes (the signed message).
    pub fn to_bytes(&self) -> SignerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SignerError::Signing(format!("encode claim: {e}")))
    }

    /// Parse claim bytes.
    pub fn from_bytes(bytes: &[u8]) -> SignerResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| SignerError::Malformed(format!("claim: {e}")))
    }
}

/// Encode claim bytes for header transport.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a header value into claim or signature bytes.
pub fn decode(s: &str) -> SignerResult<Vec<u8>> {
    if s.len() > MAX_ENCODED_CLAIM_LEN {
        return Err(SignerError::Malformed(format!(
            "token field too large: {} bytes (max: {MAX_ENCODED_CLAIM_LEN})",
            s.len()
        )));
    }
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|e| SignerError::Malformed(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn repo(s: &str) -> RepoName {
        RepoName::parse(s).unwrap()
    }

    #[test]
    fn test_canonical_encoding() {
        let claim = Claim::new(
            repo("group/repo"),
            Some(Operation::Upload),
            datetime!(2030-01-01 0:00 UTC),
        );
        let bytes = claim.to_bytes().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"exp":1893456000,"repo":"group/repo","op":"upload"}"#
        );
        assert_eq!(claim.to_bytes().unwrap(), bytes);
        assert_eq!(Claim::from_bytes(&bytes).unwrap(), claim);
    }

    #[test]
    fn test_operation_optional() {
        let claim = Claim::new(repo("r1"), None, datetime!(2030-01-01 0:00 UTC));
        let bytes = claim.to_bytes().unwrap();
        assert!(!std::str::from_utf8(&bytes).unwrap().contains("op"));
        assert_eq!(Claim::from_bytes(&bytes).unwrap().operation, None);
    }

    #[test]
    fn test_rejects_invalid_repository_in_claim() {
        let bytes = br#"{"exp":1893456000,"repo":"../escape"}"#;
        assert!(matches!(
            Claim::from_bytes(bytes),
            Err(SignerError::Malformed(_))
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let expires = datetime!(2030-01-01 0:00 UTC);
        let claim = Claim::new(repo("r1"), None, expires);
        assert!(!claim.is_expired(expires));
        assert!(claim.is_expired(expires + time::Duration::seconds(1)));
    }

    #[test]
    fn test_decode_bounds() {
        assert!(decode(&"A".repeat(MAX_ENCODED_CLAIM_LEN + 1)).is_err());
        assert!(decode("not base64!").is_err());
        assert_eq!(decode(&encode(b"hi")).unwrap(), b"hi");
    }
}
