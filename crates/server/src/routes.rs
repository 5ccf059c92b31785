//! Route configuration.

use crate::auth::request_context_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Batch negotiation. Repository names contain slashes, so the
        // handler strips the `/info/lfs/objects/batch` suffix itself.
        .route("/lfs/{*rest}", post(handlers::batch))
        // Transfers
        .route("/upload/{*rest}", put(handlers::upload))
        .route("/download/{*rest}", get(handlers::download))
        // Proxy authorization subrequest
        .route("/auth_request", get(handlers::auth_request))
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/health", get(handlers::health_check));

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(request_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
