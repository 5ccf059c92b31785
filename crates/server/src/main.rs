//! Lode server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use lode_core::config::{AppConfig, SecretConfig, TokenConfig};
use lode_server::{AppState, create_router};
use lode_signer::{SecretKey, TokenSigner};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lode - A Git LFS basic transfer server
#[derive(Parser, Debug)]
#[command(name = "loded")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "LODE_CONFIG", default_value = "config/server.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lode v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; env vars can provide or override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("LODE_") && key != "LODE_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: loded --config /path/to/config.toml\n  \
             2. Environment variables: LODE_STORAGE__PATH=/srv/lfs \
             LODE_TOKEN_SECRET=... loded\n\n\
             See config/server.example.toml for example configuration.\n\
             Set LODE_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LODE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    lode_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = lode_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;

    // Fail fast instead of reporting healthy while storage is unusable.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(
        backend = storage.backend_name(),
        path = %config.storage.path.display(),
        "Storage initialized"
    );

    let signer = load_token_signer(&config.token).await?;
    tracing::info!(ttl_secs = config.token.ttl_secs, "Token signer ready");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, signer);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load the token signer from configuration.
async fn load_token_signer(config: &TokenConfig) -> Result<TokenSigner> {
    let key = match &config.secret {
        SecretConfig::File { path } => {
            let secret = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read secret file: {}", path.display()))?;
            tracing::info!("Loaded token secret from {}", path.display());
            SecretKey::from_text(&secret).context("failed to parse token secret")?
        }
        SecretConfig::Env { var } => {
            let secret = std::env::var(var)
                .with_context(|| format!("token secret env var not set: {var}"))?;
            tracing::info!("Loaded token secret from env: {var}");
            SecretKey::from_text(&secret).context("failed to parse token secret")?
        }
        SecretConfig::Value { secret } => {
            tracing::warn!("Using inline token secret (not recommended for production)");
            SecretKey::from_text(secret).context("failed to parse token secret")?
        }
        SecretConfig::Generate => {
            tracing::warn!(
                "Generating ephemeral token secret: tokens will not verify across restarts or other instances"
            );
            SecretKey::generate()
        }
    };

    Ok(TokenSigner::new(key, config.ttl()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::{Operation, RepoName};
    use time::OffsetDateTime;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config(secret: SecretConfig) -> TokenConfig {
        TokenConfig {
            ttl_secs: 60,
            secret,
        }
    }

    #[tokio::test]
    async fn test_secret_from_file_matches_inline_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, format!("{SECRET}\n")).unwrap();

        let from_file = load_token_signer(&config(SecretConfig::File { path }))
            .await
            .unwrap();
        let inline = load_token_signer(&config(SecretConfig::Value {
            secret: SECRET.to_string(),
        }))
        .await
        .unwrap();

        let repo = RepoName::parse("r1").unwrap();
        let now = OffsetDateTime::now_utc();
        let token = from_file.mint(&repo, Some(Operation::Upload), now).unwrap();
        inline
            .verify(
                &token.signature,
                &token.claim,
                now,
                &repo,
                Some(Operation::Upload),
            )
            .unwrap();
        assert_eq!(from_file.ttl(), time::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_missing_secret_sources_fail() {
        let missing_file = config(SecretConfig::File {
            path: "/nonexistent/lode/secret".into(),
        });
        assert!(load_token_signer(&missing_file).await.is_err());

        let short = config(SecretConfig::Value {
            secret: "short".to_string(),
        });
        assert!(load_token_signer(&short).await.is_err());
    }

    #[tokio::test]
    async fn test_generated_secret() {
        assert!(load_token_signer(&config(SecretConfig::Generate)).await.is_ok());
    }
}
