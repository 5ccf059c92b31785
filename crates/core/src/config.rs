//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public origin used in action URLs (e.g., "https://lfs.example.com").
    /// When unset, the origin is derived from the batch request's Host header.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Object storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding every repository's objects.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/lfs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Source of the token signing secret.
///
/// The secret must be identical across every process serving the same
/// storage root, and must not live in version control.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretConfig {
    /// Secret stored in a file (trailing newline is ignored).
    File {
        /// Path to the secret file.
        path: PathBuf,
    },
    /// Secret stored in an environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Secret provided directly as a value (NOT recommended for production).
    Value {
        /// The secret itself.
        secret: String,
    },
    /// Generate a random secret at startup (single-process development only).
    Generate,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self::Env {
            var: "LODE_TOKEN_SECRET".to_string(),
        }
    }
}

/// Capability token configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token lifetime in seconds (default: 1 hour).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Signing secret source.
    #[serde(default)]
    pub secret: SecretConfig,
}

fn default_ttl_secs() -> u64 {
    3600 // 1 hour
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            secret: SecretConfig::default(),
        }
    }
}

impl TokenConfig {
    /// Get the token lifetime as a Duration.
    pub fn ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }
}

/// Transfer endpoint configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Verify capability tokens on the upload and download endpoints as well
    /// as on the auth delegation endpoint (default: true).
    #[serde(default = "default_require_token")]
    pub require_token: bool,
    /// When set, downloads answer with `X-Accel-Redirect: <prefix>/<object key>`
    /// instead of streaming the object (e.g., "/_lfs_objects").
    #[serde(default)]
    pub accel_redirect_prefix: Option<String>,
    /// Directory the proxy writes buffered request bodies into. Uploads that
    /// name a file via `X-File-Name` are only accepted from inside it.
    #[serde(default)]
    pub proxy_body_dir: Option<PathBuf>,
    /// Maximum accepted object size in bytes (default: unlimited).
    #[serde(default)]
    pub max_upload_size: Option<u64>,
    /// Reject uploads whose SHA-256 does not match a 64-hex OID (default: false).
    #[serde(default)]
    pub verify_content_hash: bool,
}

fn default_require_token() -> bool {
    true
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            require_token: default_require_token(),
            accel_redirect_prefix: None,
            proxy_body_dir: None,
            max_upload_size: None,
            verify_content_hash: false,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token configuration.
    #[serde(default)]
    pub token: TokenConfig,
    /// Transfer endpoint configuration.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses a fixed, publicly known secret.
    pub fn for_testing() -> Self {
        Self {
            token: TokenConfig {
                ttl_secs: default_ttl_secs(),
                secret: SecretConfig::Value {
                    secret: "test-secret-test-secret-test-secret!".to_string(),
                },
            },
            ..Default::default()
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.token.ttl_secs == 0 {
            return Err(crate::Error::Config(
                "token.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.token.ttl_secs > i64::MAX as u64 {
            return Err(crate::Error::Config(format!(
                "token.ttl_secs {} exceeds maximum value {}",
                self.token.ttl_secs,
                i64::MAX
            )));
        }

        if let Some(url) = &self.server.public_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(crate::Error::Config(format!(
                "server.public_url must start with http:// or https://, got {url}"
            )));
        }

        if let Some(prefix) = &self.transfer.accel_redirect_prefix
            && !prefix.starts_with('/')
        {
            return Err(crate::Error::Config(format!(
                "transfer.accel_redirect_prefix must start with '/', got {prefix}"
            )));
        }

        Ok(())
    }
}
