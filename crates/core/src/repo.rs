//! Repository namespace validation.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Maximum length of a full repository identifier in bytes.
pub const MAX_REPO_LEN: usize = 1024;

/// Maximum length of a single `/`-separated segment in bytes.
pub const MAX_SEGMENT_LEN: usize = 255;

/// A validated repository identifier.
///
/// A `RepoName` is a `/`-separated path of segments, each drawn from
/// `[A-Za-z0-9._-]`. It is the only way a network-supplied repository can
/// reach storage, so every rule needed to keep it a plain relative path
/// under the storage root is enforced here:
/// - no empty segments (rules out leading, trailing and doubled `/`)
/// - no `.` segment and no segment containing `..`
/// - no segment equal to the reserved objects directory name
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    /// Parse and validate a repository identifier.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidRepository(
                "repository cannot be empty".to_string(),
            ));
        }
        if s.len() > MAX_REPO_LEN {
            return Err(crate::Error::InvalidRepository(format!(
                "repository exceeds {MAX_REPO_LEN} bytes"
            )));
        }

        for segment in s.split('/') {
            validate_segment(segment)?;
        }

        Ok(Self(s.to_string()))
    }

    /// Get the repository identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn validate_segment(segment: &str) -> crate::Result<()> {
    if segment.is_empty() {
        return Err(crate::Error::InvalidRepository(
            "repository contains an empty segment".to_string(),
        ));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(crate::Error::InvalidRepository(format!(
            "repository segment exceeds {MAX_SEGMENT_LEN} bytes"
        )));
    }
    for c in segment.chars() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-') {
            return Err(crate::Error::InvalidRepository(format!(
                "invalid character in repository: {c:?}"
            )));
        }
    }
    if segment == "." || segment.contains("..") {
        return Err(crate::Error::InvalidRepository(format!(
            "repository segment '{segment}' is not a plain name"
        )));
    }
    // Case-folding filesystems would otherwise let "Objects" alias the store directory.
    if segment.eq_ignore_ascii_case(crate::OBJECTS_DIR) {
        return Err(crate::Error::InvalidRepository(format!(
            "repository segment '{segment}' is reserved"
        )));
    }
    Ok(())
}

impl<'de> Deserialize<'de> for RepoName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoName({})", self.0)
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
