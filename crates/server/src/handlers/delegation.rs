//! Authorization subrequest endpoint for a fronting proxy.
//!
//! The proxy forwards the client's token headers together with the URI it is
//! about to serve. Every failure is a plain 403 so the proxy can map it
//! without inspecting a body.

use crate::auth::verify_access_token;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::target::ObjectTarget;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

/// Header carrying the URI of the transfer being authorized.
pub const ORIGINAL_URI_HEADER: &str = "X-Original-Uri";

/// GET /auth_request
pub async fn auth_request(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let uri = headers
        .get(ORIGINAL_URI_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Forbidden(format!("missing {ORIGINAL_URI_HEADER} header")))?;

    let target = ObjectTarget::from_original_uri(uri).map_err(|e| {
        tracing::debug!(error = %e, "rejected delegated request with unusable URI");
        ApiError::Forbidden("not a transfer URL".to_string())
    })?;

    verify_access_token(&state, &headers, &target.repo, target.operation)
        .map_err(|rejection| ApiError::Forbidden(rejection.to_string()))?;

    tracing::debug!(
        repo = %target.repo,
        oid = %target.oid,
        operation = %target.operation,
        "delegated transfer authorized"
    );
    Ok(StatusCode::OK)
}
