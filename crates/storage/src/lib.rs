//! Object storage for the lode LFS server.
//!
//! This crate provides:
//! - Content-addressed object storage sharded by OID prefix
//! - A private staging area for in-flight uploads
//! - No-clobber publishing (first writer wins)

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{
    ByteStream, ObjectMeta, ObjectStore, PublishExpectations, PublishOutcome, StagedObject,
    StagedUpload,
};

use lode_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    if config.path.as_os_str().is_empty() {
        return Err(StorageError::Config("storage.path must not be empty".to_string()));
    }
    let backend = FilesystemBackend::new(&config.path).await?;
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::{Oid, RepoName};
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig {
            path: temp.path().join("store"),
        };

        let store = from_config(&config).await.unwrap();
        let repo = RepoName::parse("r1").unwrap();
        let oid = Oid::parse("abc123").unwrap();
        assert!(!store.exists(&repo, &oid).await.unwrap());
        assert!(temp.path().join("store/objects/staging").is_dir());
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn from_config_rejects_empty_path() {
        let config = StorageConfig {
            path: PathBuf::new(),
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
