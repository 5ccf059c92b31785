//! Application state shared across handlers.

use lode_core::config::AppConfig;
use lode_signer::TokenSigner;
use lode_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
///
/// Everything here is immutable after startup. Handlers share no mutable
/// in-process data; the object store is the only shared resource.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Capability token signer.
    pub signer: Arc<TokenSigner>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, storage: Arc<dyn ObjectStore>, signer: TokenSigner) -> Self {
        if config.transfer.proxy_body_dir.is_none() {
            tracing::debug!("No proxy body directory configured, X-File-Name uploads disabled");
        }
        if !config.transfer.require_token {
            tracing::warn!(
                "transfer.require_token is disabled: transfer endpoints rely on the proxy for authorization"
            );
        }

        Self {
            config: Arc::new(config),
            storage,
            signer: Arc::new(signer),
        }
    }
}
