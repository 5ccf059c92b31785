//! Server test utilities.

use lode_core::config::{AppConfig, StorageConfig};
use lode_server::{AppState, create_router};
use lode_signer::{SecretKey, TokenSigner};
use lode_storage::{FilesystemBackend, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage_path: PathBuf,
    pub proxy_dir: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and default settings.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server, letting the caller adjust the configuration.
    ///
    /// `storage.path` and `transfer.proxy_body_dir` point into the temporary
    /// directory before `adjust` runs.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let proxy_dir = temp_dir.path().join("proxy");
        std::fs::create_dir_all(&proxy_dir).expect("Failed to create proxy directory");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig {
            path: storage_path.clone(),
        };
        config.transfer.proxy_body_dir = Some(proxy_dir.clone());
        config.server.metrics_enabled = true;
        adjust(&mut config);
        config.validate().expect("Invalid test configuration");

        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let signer = TokenSigner::new(
            SecretKey::from_text("test-secret-test-secret-test-secret!")
                .expect("Failed to load test secret"),
            config.token.ttl(),
        );

        lode_server::metrics::register_metrics();

        let state = AppState::new(config, storage, signer);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage_path,
            proxy_dir,
            _temp_dir: temp_dir,
        }
    }
}
