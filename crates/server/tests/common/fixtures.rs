//! Request helpers shared by the HTTP tests.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tower::ServiceExt;

/// Host every test request is addressed to.
#[allow(dead_code)]
pub const TEST_HOST: &str = "lfs.test";

/// A collected response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Send a request through the router and collect the response.
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// POST a raw batch body for `repo`.
#[allow(dead_code)]
pub async fn batch_raw(router: &axum::Router, repo: &str, body: impl Into<Body>) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/lfs/{repo}/info/lfs/objects/batch"))
        .header("Host", TEST_HOST)
        .header("Accept", "application/vnd.git-lfs+json")
        .header("Content-Type", "application/vnd.git-lfs+json")
        .body(body.into())
        .unwrap();
    send(router, request).await
}

/// POST a batch request for `(oid, size)` pairs.
#[allow(dead_code)]
pub async fn batch(
    router: &axum::Router,
    repo: &str,
    operation: &str,
    objects: &[(&str, i64)],
) -> TestResponse {
    let objects: Vec<Value> = objects
        .iter()
        .map(|(oid, size)| json!({ "oid": oid, "size": size }))
        .collect();
    let body = json!({
        "operation": operation,
        "transfers": ["basic"],
        "objects": objects,
    });
    batch_raw(router, repo, serde_json::to_vec(&body).unwrap()).await
}

/// The action of the first object in a batch response.
#[allow(dead_code)]
pub fn first_action(batch: &Value, operation: &str) -> (String, BTreeMap<String, String>) {
    let action = &batch["objects"][0]["actions"][operation];
    let href = action["href"].as_str().expect("action href").to_string();
    let headers = serde_json::from_value(action["header"].clone()).expect("action headers");
    (href, headers)
}

/// Strip the test origin from an action URL.
#[allow(dead_code)]
pub fn path_of(href: &str) -> &str {
    href.strip_prefix(&format!("http://{TEST_HOST}"))
        .expect("href on the test origin")
}

/// PUT `data` to an upload path with the given token headers.
#[allow(dead_code)]
pub async fn upload(
    router: &axum::Router,
    path: &str,
    token: &BTreeMap<String, String>,
    data: impl Into<Bytes>,
) -> TestResponse {
    let data = data.into();
    let mut builder = Request::builder()
        .method("PUT")
        .uri(path)
        .header("Host", TEST_HOST)
        .header("Content-Type", "application/octet-stream")
        .header("Content-Length", data.len().to_string());
    for (name, value) in token {
        builder = builder.header(name.as_str(), value.as_str());
    }
    send(router, builder.body(Body::from(data)).unwrap()).await
}

/// GET a download path with the given token headers.
#[allow(dead_code)]
pub async fn download(
    router: &axum::Router,
    path: &str,
    token: &BTreeMap<String, String>,
) -> TestResponse {
    let mut builder = Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", TEST_HOST);
    for (name, value) in token {
        builder = builder.header(name.as_str(), value.as_str());
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}

/// Ask the delegation endpoint whether `original_uri` may proceed.
#[allow(dead_code)]
pub async fn auth_request(
    router: &axum::Router,
    original_uri: Option<&str>,
    token: &BTreeMap<String, String>,
) -> StatusCode {
    let mut builder = Request::builder().method("GET").uri("/auth_request");
    if let Some(uri) = original_uri {
        builder = builder.header("X-Original-Uri", uri);
    }
    for (name, value) in token {
        builder = builder.header(name.as_str(), value.as_str());
    }
    send(router, builder.body(Body::empty()).unwrap())
        .await
        .status
}

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}
