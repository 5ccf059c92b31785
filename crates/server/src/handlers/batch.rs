//! Batch API endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{BATCH_OBJECTS, BATCH_REQUESTS, TOKENS_MINTED};
use crate::state::AppState;
use crate::target::ObjectTarget;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use lode_core::config::AppConfig;
use lode_core::{
    BatchRequest, BatchResponse, LFS_MEDIA_TYPE, ObjectAction, ObjectError, ObjectResponse,
    ObjectSpec, Oid, Operation, RepoName,
};
use lode_signer::MintedToken;
use lode_storage::StorageError;
use time::OffsetDateTime;

/// Path suffix of the batch endpoint after the repository name.
const BATCH_SUFFIX: &str = "/info/lfs/objects/batch";

/// Only hash algorithm the LFS batch API defines.
const SHA256_ALGO: &str = "sha256";

/// POST /lfs/{repo}/info/lfs/objects/batch
pub async fn batch(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let repo = rest
        .strip_suffix(BATCH_SUFFIX)
        .ok_or_else(|| ApiError::NotFound(format!("no such endpoint: /lfs/{rest}")))?;
    let repo = RepoName::parse(repo)?;

    let request: BatchRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed batch request: {e}")))?;

    if !request.accepts_basic() {
        return Err(ApiError::NotImplemented(
            "only the basic transfer adapter is supported".to_string(),
        ));
    }
    let operation = Operation::parse(&request.operation)?;
    if let Some(algo) = request.hash_algo.as_deref()
        && algo != SHA256_ALGO
    {
        return Err(ApiError::Conflict(format!(
            "unsupported hash algorithm: {algo}"
        )));
    }

    let origin = resolve_origin(&state.config, &headers)?;
    BATCH_REQUESTS
        .with_label_values(&[operation.as_str()])
        .inc();

    // One token per batch, scoped to this repository and operation.
    let now = OffsetDateTime::now_utc();
    let token = state.signer.mint(&repo, Some(operation), now)?;
    TOKENS_MINTED.inc();
    let expires_in = (token.expires_at - now).whole_seconds();

    let mut objects = Vec::with_capacity(request.objects.len());
    for spec in request.objects {
        let entry = negotiate_object(&state, &repo, operation, spec, &origin, &token, expires_in)
            .await?;
        let result = if entry.error.is_some() { "error" } else { "action" };
        BATCH_OBJECTS.with_label_values(&[result]).inc();
        objects.push(entry);
    }

    tracing::info!(
        repo = %repo,
        operation = %operation,
        objects = objects.len(),
        "batch negotiated"
    );

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, LFS_MEDIA_TYPE)],
        Json(BatchResponse::basic(objects)),
    )
        .into_response())
}

/// Build the response entry for one requested object.
///
/// Problems with the entry itself become per-object errors; only storage
/// failures abort the batch.
async fn negotiate_object(
    state: &AppState,
    repo: &RepoName,
    operation: Operation,
    spec: ObjectSpec,
    origin: &str,
    token: &MintedToken,
    expires_in: i64,
) -> ApiResult<ObjectResponse> {
    let declared = spec.size.and_then(|s| u64::try_from(s).ok());

    // Responses echo the client's OID; storage and hrefs use the normalized form.
    let oid = match Oid::parse(&spec.oid) {
        Ok(oid) => oid,
        Err(e) => {
            return Ok(ObjectResponse::with_error(
                spec.oid,
                declared,
                ObjectError::invalid(format!("Invalid object: {e}")),
            ));
        }
    };

    let size = match operation {
        // Not stored yet, so the declared size is all there is. The upload
        // endpoint checks it against the bytes it receives.
        Operation::Upload => match spec.size {
            Some(size) if size >= 0 => size as u64,
            Some(_) => {
                return Ok(ObjectResponse::with_error(
                    spec.oid,
                    None,
                    ObjectError::invalid("Invalid object: size must not be negative"),
                ));
            }
            None => {
                return Ok(ObjectResponse::with_error(
                    spec.oid,
                    None,
                    ObjectError::invalid("Invalid object: size is required for upload"),
                ));
            }
        },
        Operation::Download => match state.storage.size(repo, &oid).await {
            Ok(size) => size,
            Err(StorageError::NotFound(_)) => {
                return Ok(ObjectResponse::with_error(
                    spec.oid,
                    declared,
                    ObjectError::not_found(),
                ));
            }
            Err(e) => return Err(e.into()),
        },
    };

    let target = ObjectTarget {
        operation,
        repo: repo.clone(),
        oid,
    };
    let action = ObjectAction {
        href: target.href(origin),
        header: token.headers(),
        expires_in,
        expires_at: token.expires_at,
    };
    Ok(ObjectResponse::with_action(
        spec.oid,
        size,
        operation,
        action,
    ))
}

/// Origin (scheme and authority) that action URLs are built on.
///
/// Uses `server.public_url` when configured; otherwise the request's `Host`
/// with the scheme from `X-Forwarded-Proto` (default `http`).
pub fn resolve_origin(config: &AppConfig, headers: &HeaderMap) -> ApiResult<String> {
    if let Some(url) = &config.server.public_url {
        return Ok(url.trim_end_matches('/').to_string());
    }

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Host header".to_string()))?;
    if host.is_empty() || !host.chars().all(is_authority_char) {
        return Err(ApiError::BadRequest(format!("invalid Host header: {host}")));
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");

    Ok(format!("{scheme}://{host}"))
}

fn is_authority_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']')
}
