//! Object identifiers and the content-addressed layout.

use crate::repo::RepoName;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Minimum OID length: the layout needs two 2-character shard prefixes.
pub const MIN_OID_LEN: usize = 4;

/// Maximum OID length.
pub const MAX_OID_LEN: usize = 128;

/// A validated LFS object identifier.
///
/// The server never recomputes an OID from content unless configured to, so
/// the value is opaque apart from its shape: lowercase hex of bounded length.
/// Uppercase input is accepted and normalized.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// Parse and validate an OID.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() < MIN_OID_LEN || s.len() > MAX_OID_LEN {
            return Err(crate::Error::InvalidOid(format!(
                "oid must be {MIN_OID_LEN}..={MAX_OID_LEN} hex chars, got {}",
                s.len()
            )));
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidOid(format!(
                "invalid character in oid: {c:?}"
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Get the OID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First-level shard directory (`oid[0:2]`).
    pub fn shard1(&self) -> &str {
        &self.0[..2]
    }

    /// Second-level shard directory (`oid[2:4]`).
    pub fn shard2(&self) -> &str {
        &self.0[2..4]
    }

    /// Whether this OID has the shape of a SHA-256 digest.
    pub fn is_sha256(&self) -> bool {
        self.0.len() == 64
    }
}

/// Storage-relative key of an object: `<repo>/objects/<oid[0:2]>/<oid[2:4]>/<oid>`.
///
/// Pure and deterministic. Both inputs are validated types, so the result is
/// always a relative path of plain components.
pub fn object_key(repo: &RepoName, oid: &Oid) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        repo,
        crate::OBJECTS_DIR,
        oid.shard1(),
        oid.shard2(),
        oid
    )
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
