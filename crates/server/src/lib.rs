//! HTTP server for the lode Git LFS transfer service.
//!
//! This crate provides:
//! - Batch negotiation with per-batch capability tokens
//! - Upload and download endpoints backed by an object store
//! - An authorization subrequest endpoint for a fronting proxy

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod target;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use target::ObjectTarget;
