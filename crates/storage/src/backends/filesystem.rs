//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ByteStream, ObjectMeta, ObjectStore, PublishExpectations, PublishOutcome, StagedObject,
    StagedUpload,
};
use async_trait::async_trait;
use bytes::Bytes;
use lode_core::{ContentHash, ContentHasher, OBJECTS_DIR, Oid, RepoName, object_key};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Name of the staging directory under `<root>/objects/`.
const STAGING_DIR: &str = "staging";

/// Local filesystem object store.
///
/// Layout:
/// - `<root>/<repo>/objects/<oid[0:2]>/<oid[2:4]>/<oid>` for published objects
/// - `<root>/objects/staging/<uuid>` for in-flight uploads
///
/// `objects` is never a valid repository segment, so staged files cannot be
/// addressed through any `(repo, oid)` pair.
pub struct FilesystemBackend {
    root: PathBuf,
    staging: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root and staging
    /// directories if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(OBJECTS_DIR).join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        Ok(Self { root, staging })
    }

    /// Staging directory.
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    fn staging_path(&self, id: Uuid) -> PathBuf {
        self.staging.join(id.to_string())
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// This is an async wrapper around `key_path_sync` that uses `spawn_blocking`
    /// to avoid blocking the Tokio runtime during `canonicalize` and
    /// `symlink_metadata`.
    async fn key_path(&self, key: String) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key path validation.
    ///
    /// Keys are built from validated names, so the component check only
    /// guards against future callers. The symlink checks are what matter:
    /// a symlinked repository directory must not lead outside the root.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        for component in Path::new(key).components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let canonical = path.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!(
                            "symlink target missing or invalid: {key}"
                        ))
                    } else {
                        StorageError::Io(std::io::Error::new(
                            e.kind(),
                            format!("failed to canonicalize path: {e}"),
                        ))
                    }
                })?;

                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StorageError::Io(std::io::Error::new(
                    err.kind(),
                    format!("failed to stat path: {err}"),
                )));
            }
        }

        // New path: the nearest existing ancestor must resolve inside the root,
        // otherwise create_dir_all would follow a symlink out of it.
        let mut ancestor = path.as_path();
        while let Some(parent) = ancestor.parent() {
            match std::fs::symlink_metadata(parent) {
                Ok(meta) => {
                    let parent_canonical = parent.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "ancestor symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize ancestor: {e}"),
                            ))
                        }
                    })?;

                    if !parent_canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "ancestor path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat ancestor: {err}"),
                    )));
                }
            }
            ancestor = parent;
        }

        Ok(path)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn hash_file(path: &Path) -> StorageResult<ContentHash> {
        let mut file = fs::File::open(path).await?;
        let mut hasher = ContentHasher::default();
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }

    async fn publish_staged(
        &self,
        key: String,
        staged_path: &Path,
        staged: &StagedObject,
        expected: &PublishExpectations,
    ) -> StorageResult<PublishOutcome> {
        let meta = fs::metadata(staged_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::StagingMissing(staged.id.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        // The file on disk is authoritative, whatever the writer counted.
        if meta.len() != expected.size {
            return Err(StorageError::SizeMismatch {
                expected: expected.size,
                actual: meta.len(),
            });
        }

        if let Some(required) = &expected.sha256 {
            let actual = match staged.sha256 {
                Some(hash) => hash,
                None => Self::hash_file(staged_path).await?,
            };
            if &actual != required {
                return Err(StorageError::HashMismatch {
                    expected: required.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }

        let final_path = self.key_path(key).await?;
        self.ensure_parent(&final_path).await?;

        // A hard link never replaces an existing destination, which gives
        // first-writer-wins without a check-then-act window.
        match fs::hard_link(staged_path, &final_path).await {
            Ok(()) => Ok(PublishOutcome::Published),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PublishOutcome::AlreadyPresent),
            Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
                debug!(error = %e, "hard links unavailable, falling back to no-replace rename");
                let from = staged_path.to_path_buf();
                let to = final_path.clone();
                let renamed = tokio::task::spawn_blocking(move || rename_noreplace(&from, &to))
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
                match renamed {
                    Ok(()) => Ok(PublishOutcome::Published),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        Ok(PublishOutcome::AlreadyPresent)
                    }
                    Err(e) => Err(StorageError::Io(e)),
                }
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn remove_staged(path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged file"),
        }
    }
}

/// Rename that fails with `AlreadyExists` instead of replacing an existing
/// destination. Uses Linux `renameat2(RENAME_NOREPLACE)`.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn rename_noreplace(src: &Path, dest: &Path) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let src_c = CString::new(src.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;
    let dest_c = CString::new(dest.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;

    // SAFETY: both pointers come from live CStrings and AT_FDCWD resolves
    // relative paths against the working directory. The kernel only reads
    // the two path strings.
    let ret = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            src_c.as_ptr(),
            libc::AT_FDCWD,
            dest_c.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if ret == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        // The filesystem does not support the flag.
        Some(libc::EINVAL) | Some(libc::ENOSYS) => rename_checked(src, dest),
        _ => Err(err),
    }
}

#[cfg(not(target_os = "linux"))]
fn rename_noreplace(src: &Path, dest: &Path) -> std::io::Result<()> {
    rename_checked(src, dest)
}

/// Check-then-rename. Two writers racing inside the window can both succeed,
/// the later one replacing the earlier file with content for the same OID.
fn rename_checked(src: &Path, dest: &Path) -> std::io::Result<()> {
    if dest.try_exists()? {
        return Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "destination already exists",
        ));
    }
    std::fs::rename(src, dest)
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    fn path_for(&self, repo: &RepoName, oid: &Oid) -> PathBuf {
        self.root.join(object_key(repo, oid))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, repo: &RepoName, oid: &Oid) -> StorageResult<bool> {
        let path = self.key_path(object_key(repo, oid)).await?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, repo: &RepoName, oid: &Oid) -> StorageResult<ObjectMeta> {
        let key = object_key(repo, oid);
        let path = self.key_path(key.clone()).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::not_found_or_io(&key, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key));
        }

        Ok(ObjectMeta { size: metadata.len() })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, repo: &RepoName, oid: &Oid) -> StorageResult<ByteStream> {
        let key = object_key(repo, oid);
        let path = self.key_path(key.clone()).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::not_found_or_io(&key, e))?;

        // Stream the file in chunks instead of loading entirely into memory
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn begin_upload(&self, compute_hash: bool) -> StorageResult<Box<dyn StagedUpload>> {
        let id = Uuid::new_v4();
        let path = self.staging_path(id);
        let file = fs::File::create(&path).await?;

        Ok(Box::new(FilesystemUpload {
            file,
            id,
            path,
            bytes_written: 0,
            hasher: compute_hash.then(ContentHasher::default),
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn adopt(&self, source: &Path) -> StorageResult<StagedObject> {
        let id = Uuid::new_v4();
        let dest = self.staging_path(id);

        match fs::rename(source, &dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                debug!("proxy body on another filesystem, copying into staging");
                if let Err(e) = fs::copy(source, &dest).await {
                    Self::remove_staged(&dest).await;
                    return Err(StorageError::not_found_or_io(&source.display().to_string(), e));
                }
                // Staging now owns the bytes; a leftover source is only clutter.
                if let Err(e) = fs::remove_file(source).await {
                    warn!(path = %source.display(), error = %e, "failed to remove proxy body file");
                }
            }
            Err(e) => {
                return Err(StorageError::not_found_or_io(
                    &source.display().to_string(),
                    e,
                ));
            }
        }

        let size = fs::metadata(&dest).await?.len();
        Ok(StagedObject {
            id,
            size,
            sha256: None,
        })
    }

    #[instrument(skip(self, expected), fields(backend = "filesystem", size = expected.size))]
    async fn publish(
        &self,
        repo: &RepoName,
        oid: &Oid,
        staged: StagedObject,
        expected: &PublishExpectations,
    ) -> StorageResult<PublishOutcome> {
        let staged_path = self.staging_path(staged.id);
        let result = self
            .publish_staged(object_key(repo, oid), &staged_path, &staged, expected)
            .await;
        // Published objects are hard links (or the renamed file itself), so the
        // staging entry is dropped in every case.
        Self::remove_staged(&staged_path).await;
        result
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn discard(&self, staged: StagedObject) -> StorageResult<()> {
        Self::remove_staged(&self.staging_path(staged.id)).await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        for dir in [&self.root, &self.staging] {
            let metadata = fs::metadata(dir).await.map_err(|e| {
                StorageError::Io(std::io::Error::new(
                    e.kind(),
                    format!("storage directory not accessible: {e}"),
                ))
            })?;

            if !metadata.is_dir() {
                return Err(StorageError::Io(std::io::Error::new(
                    ErrorKind::NotADirectory,
                    format!("storage path is not a directory: {dir:?}"),
                )));
            }
        }

        Ok(())
    }
}

/// Streaming upload into the staging area.
struct FilesystemUpload {
    file: fs::File,
    id: Uuid,
    path: PathBuf,
    bytes_written: u64,
    hasher: Option<ContentHasher>,
}

#[async_trait]
impl StagedUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&data);
        }
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn finish(self: Box<Self>) -> StorageResult<StagedObject> {
        let this = *self;
        // Ensure all data is on disk before the object can become visible
        this.file.sync_all().await?;
        Ok(StagedObject {
            id: this.id,
            size: this.bytes_written,
            sha256: this.hasher.map(ContentHasher::finalize),
        })
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        FilesystemBackend::remove_staged(&self.path).await;
        Ok(())
    }
}
