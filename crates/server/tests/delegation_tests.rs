//! Integration tests for the proxy authorization subrequest endpoint.

mod common;

use axum::http::StatusCode;
use common::fixtures::{auth_request, batch, first_action, path_of, seeded_bytes, upload};
use common::TestServer;
use lode_core::{Operation, RepoName};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

/// Upload `abc123` (42 bytes) into `repo` through the batch API.
async fn store_object(server: &TestServer, repo: &str) {
    let response = batch(&server.router, repo, "upload", &[("abc123", 42)]).await;
    let (href, token) = first_action(&response.json(), "upload");
    let response = upload(&server.router, path_of(&href), &token, seeded_bytes(3, 42)).await;
    assert_eq!(response.status, StatusCode::OK);
}

/// Token headers from a batch for `abc123`. Download batches only carry
/// actions for stored objects, so the object is uploaded first.
async fn token_for(server: &TestServer, repo: &str, operation: &str) -> BTreeMap<String, String> {
    if operation == "download" {
        store_object(server, repo).await;
    }
    let response = batch(&server.router, repo, operation, &[("abc123", 42)]).await;
    assert_eq!(response.status, StatusCode::OK);
    first_action(&response.json(), operation).1
}

#[tokio::test]
async fn test_batch_token_authorizes_its_transfer() {
    let server = TestServer::new().await;
    let token = token_for(&server, "r1", "upload").await;

    let status = auth_request(&server.router, Some("/upload/r1/abc123"), &token).await;
    assert_eq!(status, StatusCode::OK);

    // The token covers the whole repository, not only the negotiated OID.
    let status = auth_request(&server.router, Some("/upload/r1/def456"), &token).await;
    assert_eq!(status, StatusCode::OK);

    // Query strings the proxy forwards are ignored.
    let status = auth_request(&server.router, Some("/upload/r1/abc123?x=1"), &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_token_is_bound_to_repository_and_operation() {
    let server = TestServer::new().await;
    let token = token_for(&server, "group/r1", "upload").await;

    for uri in [
        "/upload/group/r2/abc123",
        "/upload/group/r1x/abc123",
        "/upload/group/abc123",
        "/download/group/r1/abc123",
    ] {
        assert_eq!(
            auth_request(&server.router, Some(uri), &token).await,
            StatusCode::FORBIDDEN,
            "{uri}"
        );
    }
}

#[tokio::test]
async fn test_missing_or_malformed_inputs_are_forbidden() {
    let server = TestServer::new().await;
    let token = token_for(&server, "r1", "download").await;

    assert_eq!(
        auth_request(&server.router, None, &token).await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        auth_request(&server.router, Some("/download/r1/abc123"), &BTreeMap::new()).await,
        StatusCode::FORBIDDEN
    );

    for uri in [
        "/download/r1",
        "/download/../r1/abc123",
        "/download/r1/objects/abc123",
        "/download/r1/not-hex",
        "/lfs/r1/info/lfs/objects/batch",
        "download/r1/abc123",
    ] {
        assert_eq!(
            auth_request(&server.router, Some(uri), &token).await,
            StatusCode::FORBIDDEN,
            "{uri}"
        );
    }
}

#[tokio::test]
async fn test_tampered_token_is_forbidden() {
    let server = TestServer::new().await;
    let token = token_for(&server, "r1", "download").await;

    let mut forged = token.clone();
    let key = forged.get_mut("X-Access-Key").unwrap();
    let flipped = if key.ends_with('A') { 'B' } else { 'A' };
    key.pop();
    key.push(flipped);
    assert_eq!(
        auth_request(&server.router, Some("/download/r1/abc123"), &forged).await,
        StatusCode::FORBIDDEN
    );

    // A claim from another batch cannot be paired with this signature.
    let other = token_for(&server, "r2", "download").await;
    let mut mixed = token.clone();
    mixed.insert("X-Access-Info".to_string(), other["X-Access-Info"].clone());
    assert_eq!(
        auth_request(&server.router, Some("/download/r2/abc123"), &mixed).await,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_expired_token_is_forbidden() {
    let server = TestServer::new().await;
    let repo = RepoName::parse("r1").unwrap();

    let expired = server
        .state
        .signer
        .mint_with_ttl(
            &repo,
            Some(Operation::Download),
            OffsetDateTime::now_utc(),
            Duration::seconds(-1),
        )
        .unwrap();
    assert_eq!(
        auth_request(&server.router, Some("/download/r1/abc123"), &expired.headers()).await,
        StatusCode::FORBIDDEN
    );

    let fresh = server
        .state
        .signer
        .mint(&repo, Some(Operation::Download), OffsetDateTime::now_utc())
        .unwrap();
    assert_eq!(
        auth_request(&server.router, Some("/download/r1/abc123"), &fresh.headers()).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_tokens_survive_a_new_instance() {
    // Two routers sharing a secret stand in for a restart or a second replica.
    let first = TestServer::new().await;
    let second = TestServer::new().await;
    let token = token_for(&first, "r1", "upload").await;

    assert_eq!(
        auth_request(&second.router, Some("/upload/r1/abc123"), &token).await,
        StatusCode::OK
    );
}
