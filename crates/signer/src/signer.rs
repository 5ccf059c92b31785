//! Token minting and verification.

use crate::claim::{self, Claim};
use crate::error::{SignerError, SignerResult};
use crate::key::SecretKey;
use crate::{ACCESS_INFO_HEADER, ACCESS_KEY_HEADER};
use hmac::{Hmac, Mac};
use lode_core::{Operation, RepoName};
use sha2::Sha256;
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime.
pub const DEFAULT_TTL: Duration = Duration::hours(1);

/// A freshly minted token, ready to hand to a client.
#[derive(Clone, Debug)]
pub struct MintedToken {
    /// Encoded signature (`X-Access-Key`).
    pub signature: String,
    /// Encoded claim (`X-Access-Info`).
    pub claim: String,
    /// When the token stops verifying.
    pub expires_at: OffsetDateTime,
}

impl MintedToken {
    /// Header map a client must attach to its transfer request.
    pub fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ACCESS_KEY_HEADER.to_string(), self.signature.clone()),
            (ACCESS_INFO_HEADER.to_string(), self.claim.clone()),
        ])
    }
}

/// Mints and verifies capability tokens under one secret.
///
/// Holds no per-token state; cloning it or constructing another instance
/// from the same secret yields a signer that accepts the same tokens.
#[derive(Clone, Debug)]
pub struct TokenSigner {
    key: SecretKey,
    ttl: Duration,
}

impl TokenSigner {
    /// Create a signer with the given default lifetime.
    pub fn new(key: SecretKey, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    /// Create a signer with the default one-hour lifetime.
    pub fn with_default_ttl(key: SecretKey) -> Self {
        Self::new(key, DEFAULT_TTL)
    }

    /// Default token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token valid for the default lifetime from `now`.
    pub fn mint(
        &self,
        repo: &RepoName,
        operation: Option<Operation>,
        now: OffsetDateTime,
    ) -> SignerResult<MintedToken> {
        self.mint_with_ttl(repo, operation, now, self.ttl)
    }

    /// Mint a token valid for `ttl` from `now`.
    pub fn mint_with_ttl(
        &self,
        repo: &RepoName,
        operation: Option<Operation>,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> SignerResult<MintedToken> {
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| SignerError::Signing("token expiry overflows".to_string()))?;
        let claim = Claim::new(repo.clone(), operation, expires_at);
        let bytes = claim.to_bytes()?;
        let tag = self.mac(&bytes)?.finalize().into_bytes();

        Ok(MintedToken {
            signature: claim::encode(&tag),
            claim: claim::encode(&bytes),
            // Round-trip through the claim so the reported expiry is exactly
            // what verification will enforce (whole seconds).
            expires_at: claim.expires_at()?,
        })
    }

    /// Verify a token against the resource being accessed.
    ///
    /// Checks, in order: the signature over the received claim bytes, the
    /// claim encoding, expiry, repository scope, then operation scope (only
    /// when both the claim and the caller name an operation).
    pub fn verify(
        &self,
        signature: &str,
        claim: &str,
        now: OffsetDateTime,
        expected_repo: &RepoName,
        expected_operation: Option<Operation>,
    ) -> SignerResult<Claim> {
        let claim_bytes = claim::decode(claim)?;
        let signature = claim::decode(signature)?;

        // verify_slice compares in constant time
        self.mac(&claim_bytes)?
            .verify_slice(&signature)
            .map_err(|_| SignerError::VerificationFailed)?;

        let claim = Claim::from_bytes(&claim_bytes)?;

        if claim.is_expired(now) {
            return Err(SignerError::Expired);
        }
        if &claim.repo != expected_repo {
            return Err(SignerError::RepositoryMismatch(expected_repo.to_string()));
        }
        if let (Some(granted), Some(expected)) = (claim.operation, expected_operation)
            && granted != expected
        {
            return Err(SignerError::OperationMismatch(expected.to_string()));
        }

        Ok(claim)
    }

    fn mac(&self, message: &[u8]) -> SignerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        mac.update(message);
        Ok(mac)
    }
}
