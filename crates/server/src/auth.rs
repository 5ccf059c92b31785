//! Request context and capability token checks.

use crate::metrics::record_token_verification;
use crate::state::AppState;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use lode_core::{Operation, RepoName};
use lode_signer::{ACCESS_INFO_HEADER, ACCESS_KEY_HEADER, Claim, SignerError};
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is sanitized: truncated to MAX_TRACE_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        // Limit by character count, not byte count, to avoid UTF-8 boundary
        // panics, then keep ASCII only for log safety.
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Middleware that assigns a trace ID and runs the request inside a span
/// carrying it.
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// Why a presented token was refused.
#[derive(Debug, thiserror::Error)]
pub enum TokenRejection {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("{0} header is not valid ASCII")]
    InvalidHeader(&'static str),

    #[error(transparent)]
    Refused(#[from] SignerError),
}

impl TokenRejection {
    fn outcome(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) | Self::InvalidHeader(_) => "missing",
            Self::Refused(SignerError::Malformed(_)) => "malformed",
            Self::Refused(SignerError::VerificationFailed) => "bad_signature",
            Self::Refused(SignerError::Expired) => "expired",
            Self::Refused(SignerError::RepositoryMismatch(_))
            | Self::Refused(SignerError::OperationMismatch(_)) => "scope_mismatch",
            Self::Refused(_) => "error",
        }
    }
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, TokenRejection> {
    headers
        .get(name)
        .ok_or(TokenRejection::MissingHeader(name))?
        .to_str()
        .map_err(|_| TokenRejection::InvalidHeader(name))
}

fn check_token(
    state: &AppState,
    headers: &HeaderMap,
    repo: &RepoName,
    operation: Operation,
) -> Result<Claim, TokenRejection> {
    let signature = required_header(headers, ACCESS_KEY_HEADER)?;
    let claim = required_header(headers, ACCESS_INFO_HEADER)?;
    let claim = state.signer.verify(
        signature,
        claim,
        OffsetDateTime::now_utc(),
        repo,
        Some(operation),
    )?;
    Ok(claim)
}

/// Verify the token carried in `X-Access-Key` / `X-Access-Info` against the
/// object being accessed.
///
/// The header values are never logged.
pub fn verify_access_token(
    state: &AppState,
    headers: &HeaderMap,
    repo: &RepoName,
    operation: Operation,
) -> Result<Claim, TokenRejection> {
    let result = check_token(state, headers, repo, operation);
    match &result {
        Ok(_) => record_token_verification("accepted"),
        Err(rejection) => {
            record_token_verification(rejection.outcome());
            tracing::debug!(repo = %repo, operation = %operation, reason = %rejection, "token rejected");
        }
    }
    result
}
