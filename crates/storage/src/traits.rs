//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use lode_core::{ContentHash, Oid, RepoName};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use uuid::Uuid;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
}

/// A fully written object waiting in the staging area.
///
/// Staged objects are private to the request that created them and are
/// consumed by [`ObjectStore::publish`] or [`ObjectStore::discard`].
#[derive(Debug)]
pub struct StagedObject {
    /// Staging identifier.
    pub id: Uuid,
    /// Bytes written.
    pub size: u64,
    /// SHA-256 of the staged bytes, when computed during the write.
    pub sha256: Option<ContentHash>,
}

/// What the published object must look like.
#[derive(Clone, Debug)]
pub struct PublishExpectations {
    /// Declared size in bytes.
    pub size: u64,
    /// Required SHA-256 of the content, if verification is enabled.
    pub sha256: Option<ContentHash>,
}

/// Result of a successful publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This call placed the object.
    Published,
    /// An earlier writer already placed the object; the staged copy was dropped.
    AlreadyPresent,
}

/// Content-addressed object store. Objects are keyed by `(repository, oid)`
/// and immutable once published.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Location of an object. Pure; performs no I/O.
    fn path_for(&self, repo: &RepoName, oid: &Oid) -> PathBuf;

    /// Check if an object exists.
    async fn exists(&self, repo: &RepoName, oid: &Oid) -> StorageResult<bool>;

    /// Get an object's metadata without fetching content.
    async fn head(&self, repo: &RepoName, oid: &Oid) -> StorageResult<ObjectMeta>;

    /// Get an object's size in bytes.
    async fn size(&self, repo: &RepoName, oid: &Oid) -> StorageResult<u64> {
        Ok(self.head(repo, oid).await?.size)
    }

    /// Get an object as a byte stream.
    async fn get_stream(&self, repo: &RepoName, oid: &Oid) -> StorageResult<ByteStream>;

    /// Start writing a new staged object.
    async fn begin_upload(&self, compute_hash: bool) -> StorageResult<Box<dyn StagedUpload>>;

    /// Move an already written file into the staging area.
    async fn adopt(&self, source: &Path) -> StorageResult<StagedObject>;

    /// Publish a staged object at its content-addressed location.
    ///
    /// The staged object is consumed whatever the outcome. On error nothing
    /// is left at the destination.
    ///
    /// An existing object is never replaced: the first writer gets
    /// [`PublishOutcome::Published`], later ones [`PublishOutcome::AlreadyPresent`].
    /// The one exception is a filesystem that supports neither hard links nor
    /// no-replace renames, where two racing writers can both succeed and the
    /// later file (same OID, same verified size) replaces the earlier one.
    async fn publish(
        &self,
        repo: &RepoName,
        oid: &Oid,
        staged: StagedObject,
        expected: &PublishExpectations,
    ) -> StorageResult<PublishOutcome>;

    /// Drop a staged object without publishing it.
    async fn discard(&self, staged: StagedObject) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend accessibility.
    ///
    /// Called during server startup and by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming uploads into the staging area.
#[async_trait]
pub trait StagedUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Bytes written so far.
    fn bytes_written(&self) -> u64;

    /// Flush the staged file and hand it over for publishing.
    async fn finish(self: Box<Self>) -> StorageResult<StagedObject>;

    /// Abort the upload, removing the staged file.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
