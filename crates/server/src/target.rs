//! Transfer URL shapes.
//!
//! Transfer URLs look like `/upload/<repo>/<oid>` or `/download/<repo>/<oid>`.
//! The repository may contain slashes, so the OID is split off from the right.

use lode_core::{Oid, Operation, RepoName};

/// Path prefix of upload URLs.
pub const UPLOAD_PREFIX: &str = "/upload/";

/// Path prefix of download URLs.
pub const DOWNLOAD_PREFIX: &str = "/download/";

/// The object a transfer URL names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectTarget {
    pub operation: Operation,
    pub repo: RepoName,
    pub oid: Oid,
}

impl ObjectTarget {
    /// Parse the `<repo>/<oid>` remainder of a transfer URL.
    pub fn from_path(operation: Operation, rest: &str) -> lode_core::Result<Self> {
        let (repo, oid) = rest
            .rsplit_once('/')
            .ok_or_else(|| lode_core::Error::InvalidOid(format!("no object id in path: {rest}")))?;
        Ok(Self {
            operation,
            repo: RepoName::parse(repo)?,
            oid: Oid::parse(oid)?,
        })
    }

    /// Recover the target from the original request URI forwarded by the
    /// proxy. Any query string is ignored.
    pub fn from_original_uri(uri: &str) -> lode_core::Result<Self> {
        let path = uri.split_once('?').map_or(uri, |(path, _)| path);

        if let Some(rest) = path.strip_prefix(UPLOAD_PREFIX) {
            Self::from_path(Operation::Upload, rest)
        } else if let Some(rest) = path.strip_prefix(DOWNLOAD_PREFIX) {
            Self::from_path(Operation::Download, rest)
        } else {
            Err(lode_core::Error::UnknownOperation(format!(
                "not a transfer URL: {path}"
            )))
        }
    }

    /// Absolute URL of this target under `origin`.
    pub fn href(&self, origin: &str) -> String {
        let prefix = match self.operation {
            Operation::Upload => UPLOAD_PREFIX,
            Operation::Download => DOWNLOAD_PREFIX,
        };
        format!("{origin}{prefix}{}/{}", self.repo, self.oid)
    }
}
