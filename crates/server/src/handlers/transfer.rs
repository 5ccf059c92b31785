//! Upload and download endpoints.

use crate::auth::verify_access_token;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_UPLOADED, DOWNLOADS, OBJECTS_PUBLISHED, UPLOAD_DURATION, record_upload_error,
};
use crate::state::AppState;
use crate::target::ObjectTarget;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use lode_core::{ContentHash, Operation, object_key};
use lode_storage::{PublishExpectations, PublishOutcome, StagedObject, StorageError};
use std::path::PathBuf;
use std::time::Instant;

/// Header naming a request body file the proxy already wrote to disk.
pub const FILE_NAME_HEADER: &str = "X-File-Name";

/// Header carrying the declared object size.
pub const FILE_SIZE_HEADER: &str = "X-File-Size";

/// Header instructing the proxy to serve a file itself.
pub const ACCEL_REDIRECT_HEADER: &str = "X-Accel-Redirect";

fn authorize(state: &AppState, headers: &HeaderMap, target: &ObjectTarget) -> ApiResult<()> {
    if !state.config.transfer.require_token {
        return Ok(());
    }
    verify_access_token(state, headers, &target.repo, target.operation)
        .map(|_| ())
        .map_err(|rejection| ApiError::Unauthorized(rejection.to_string()))
}

/// Declared object size: `X-File-Size`, else `Content-Length`.
fn declared_size(headers: &HeaderMap) -> ApiResult<u64> {
    let (name, value) = [FILE_SIZE_HEADER, "Content-Length"]
        .into_iter()
        .find_map(|name| headers.get(name).map(|value| (name, value)))
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "missing object size: send {FILE_SIZE_HEADER} or Content-Length"
            ))
        })?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {name} header")))
}

/// PUT /upload/{repo}/{oid}
///
/// A proxy-buffered body named by `X-File-Name` is either adopted into
/// staging or removed before the response is sent.
pub async fn upload(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<StatusCode> {
    let mut proxy_file = match headers.get(FILE_NAME_HEADER) {
        Some(value) => {
            let name = value
                .to_str()
                .map_err(|_| ApiError::BadRequest(format!("invalid {FILE_NAME_HEADER} header")))?;
            Some(resolve_proxy_file(&state, name).await?)
        }
        None => None,
    };

    let result = receive_upload(&state, &rest, &headers, body, &mut proxy_file).await;

    if let Some(path) = proxy_file {
        remove_proxy_file(&path).await;
    }
    result
}

async fn receive_upload(
    state: &AppState,
    rest: &str,
    headers: &HeaderMap,
    body: Body,
    proxy_file: &mut Option<PathBuf>,
) -> ApiResult<StatusCode> {
    let start_time = Instant::now();
    let target = ObjectTarget::from_path(Operation::Upload, rest)?;
    authorize(state, headers, &target)?;

    let size = declared_size(headers)?;
    if let Some(limit) = state.config.transfer.max_upload_size
        && size > limit
    {
        record_upload_error("too_large");
        return Err(ApiError::PayloadTooLarge { size, limit });
    }

    if state.storage.exists(&target.repo, &target.oid).await? {
        tracing::debug!(repo = %target.repo, oid = %target.oid, "object already present, skipping upload");
        OBJECTS_PUBLISHED
            .with_label_values(&["already_present"])
            .inc();
        return Ok(StatusCode::OK);
    }

    let sha256 = if state.config.transfer.verify_content_hash && target.oid.is_sha256() {
        Some(ContentHash::from_hex(target.oid.as_str())?)
    } else {
        None
    };

    let staged = match proxy_file.clone() {
        Some(source) => {
            let staged = state.storage.adopt(&source).await?;
            *proxy_file = None;
            staged
        }
        None => stage_body(state, body, size, sha256.is_some()).await?,
    };

    let expected = PublishExpectations { size, sha256 };
    let outcome = match state
        .storage
        .publish(&target.repo, &target.oid, staged, &expected)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            record_upload_error(match &e {
                StorageError::SizeMismatch { .. } => "size_mismatch",
                StorageError::HashMismatch { .. } => "hash_mismatch",
                _ => "storage",
            });
            return Err(e.into());
        }
    };

    match outcome {
        PublishOutcome::Published => {
            OBJECTS_PUBLISHED.with_label_values(&["published"]).inc();
            BYTES_UPLOADED.inc_by(size);
        }
        PublishOutcome::AlreadyPresent => {
            OBJECTS_PUBLISHED
                .with_label_values(&["already_present"])
                .inc();
        }
    }
    UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());

    tracing::info!(
        repo = %target.repo,
        oid = %target.oid,
        size,
        outcome = ?outcome,
        "upload complete"
    );

    Ok(StatusCode::OK)
}

/// Stream the request body into the staging area, refusing to accept more
/// than the declared size.
async fn stage_body(
    state: &AppState,
    body: Body,
    declared: u64,
    compute_hash: bool,
) -> ApiResult<StagedObject> {
    let mut upload = state.storage.begin_upload(compute_hash).await?;
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                upload.abort().await?;
                record_upload_error("body_read");
                return Err(ApiError::BadRequest(format!(
                    "failed to read upload body: {e}"
                )));
            }
        };

        if upload.bytes_written() + chunk.len() as u64 > declared {
            upload.abort().await?;
            record_upload_error("size_mismatch");
            return Err(ApiError::BadRequest(format!(
                "upload body exceeds declared size of {declared} bytes"
            )));
        }

        if let Err(e) = upload.write(chunk).await {
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(error = %abort_err, "failed to abort staged upload");
            }
            return Err(e.into());
        }
    }

    Ok(upload.finish().await?)
}

/// Delete a proxy-buffered body that was not adopted.
async fn remove_proxy_file(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed unused proxy body file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove proxy body file")
        }
    }
}

/// Resolve an `X-File-Name` value to a file inside the proxy body directory.
async fn resolve_proxy_file(state: &AppState, name: &str) -> ApiResult<PathBuf> {
    let dir = state
        .config
        .transfer
        .proxy_body_dir
        .clone()
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "{FILE_NAME_HEADER} is not accepted: no proxy body directory configured"
            ))
        })?;
    let candidate = PathBuf::from(name);

    tokio::task::spawn_blocking(move || {
        let dir = dir
            .canonicalize()
            .map_err(|e| ApiError::Internal(format!("proxy body directory unusable: {e}")))?;
        let candidate = if candidate.is_absolute() {
            candidate
        } else {
            dir.join(candidate)
        };
        let file = candidate
            .canonicalize()
            .map_err(|_| ApiError::BadRequest("proxy body file not found".to_string()))?;

        if !file.starts_with(&dir) || !file.is_file() {
            return Err(ApiError::BadRequest(
                "proxy body file is outside the proxy body directory".to_string(),
            ));
        }
        Ok(file)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("spawn_blocking failed: {e}")))?
}

/// GET /download/{repo}/{oid}
pub async fn download(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let target = ObjectTarget::from_path(Operation::Download, &rest)?;
    authorize(&state, &headers, &target)?;

    let meta = match state.storage.head(&target.repo, &target.oid).await {
        Ok(meta) => meta,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound("Object does not exist".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(prefix) = &state.config.transfer.accel_redirect_prefix {
        let location = format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            object_key(&target.repo, &target.oid)
        );
        DOWNLOADS.with_label_values(&["redirect"]).inc();
        tracing::debug!(repo = %target.repo, oid = %target.oid, "delegating download to proxy");
        return Ok((StatusCode::OK, [(ACCEL_REDIRECT_HEADER, location)]).into_response());
    }

    let stream = state.storage.get_stream(&target.repo, &target.oid).await?;
    let body_stream = stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));
    DOWNLOADS.with_label_values(&["direct"]).inc();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, meta.size.to_string()),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}
