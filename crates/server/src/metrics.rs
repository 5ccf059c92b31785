//! Prometheus metrics for the lode server.
//!
//! Exposes counters for batch negotiation, token verification, and object
//! transfers.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no repository names or OIDs, only aggregate counts.
//!
//! **Deployment Requirement**: The `/metrics` endpoint MUST be network-restricted
//! to authorized Prometheus scraper IPs only. Do NOT expose `/metrics` on
//! public networks.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Batch metrics
pub static BATCH_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lode_batch_requests_total",
            "Total batch requests by operation",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static BATCH_OBJECTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lode_batch_objects_total",
            "Total objects negotiated by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

// Token metrics
pub static TOKENS_MINTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("lode_tokens_minted_total", "Total capability tokens minted")
        .expect("metric creation failed")
});

pub static TOKEN_VERIFICATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lode_token_verifications_total",
            "Total token verifications by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Transfer metrics
pub static OBJECTS_PUBLISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lode_objects_published_total",
            "Total upload requests by publish outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "lode_bytes_uploaded_total",
        "Total bytes uploaded (newly published objects only)",
    )
    .expect("metric creation failed")
});

pub static DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("lode_downloads_total", "Total downloads served by mode"),
        &["mode"],
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("lode_upload_errors_total", "Total upload errors by error type"),
        &["error_type"],
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "lode_upload_duration_seconds",
            "Time taken to stage and publish an upload",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
/// This allows safe use in integration tests or when embedding multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(BATCH_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BATCH_OBJECTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_MINTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKEN_VERIFICATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OBJECTS_PUBLISHED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}

/// Helper to record a token verification outcome.
pub fn record_token_verification(outcome: &str) {
    TOKEN_VERIFICATIONS.with_label_values(&[outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // This would panic if any metric creation failed
        register_metrics();
        register_metrics();
    }
}
