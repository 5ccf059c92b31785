use bytes::Bytes;
use lode_storage::{FilesystemBackend, ObjectStore, StagedObject};
use std::sync::Arc;
use tempfile::TempDir;

/// Create a backend rooted in a fresh temporary directory.
pub async fn new_backend() -> (TempDir, Arc<FilesystemBackend>) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path()).await.unwrap();
    (temp_dir, Arc::new(backend))
}

/// Stream `data` into the staging area in chunks of `chunk` bytes.
pub async fn stage_bytes(
    backend: &FilesystemBackend,
    data: &[u8],
    chunk: usize,
) -> StagedObject {
    let mut upload = backend.begin_upload(false).await.unwrap();
    for part in data.chunks(chunk) {
        upload.write(Bytes::copy_from_slice(part)).await.unwrap();
    }
    upload.finish().await.unwrap()
}

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
