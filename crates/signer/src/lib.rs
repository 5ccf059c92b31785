//! Capability tokens for the lode LFS server.
//!
//! A token is a claim (expiry, repository, optional operation) plus an
//! HMAC-SHA256 signature over the claim bytes. Nothing is stored server side:
//! any process holding the same secret can verify any token.
//!
//! This crate provides:
//! - Secret key handling with length bounds
//! - Canonical claim encoding
//! - Minting and verification

pub mod claim;
pub mod error;
pub mod key;
pub mod signer;

pub use claim::Claim;
pub use error::{SignerError, SignerResult};
pub use key::SecretKey;
pub use signer::{MintedToken, TokenSigner};

/// Header carrying the token signature.
pub const ACCESS_KEY_HEADER: &str = "X-Access-Key";

/// Header carrying the encoded claim.
pub const ACCESS_INFO_HEADER: &str = "X-Access-Info";
