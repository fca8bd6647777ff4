//! Admission control integration tests
//!
//! Requests beyond a pool's ceiling are shed immediately with 429; the two
//! pools never borrow capacity from each other.

use std::time::Duration;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::{
    matchers::{any, method},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{build_state, endpoint, spawn_proxy, test_server, wait_until, TestConfig};

async fn ok_upstream() -> MockServer {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
        .mount(&upstream)
        .await;
    upstream
}

#[tokio::test]
async fn test_full_pool_rejects_with_429() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let state = build_state(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
            .limits(2, 1)
            .build(),
    );
    let server = test_server(state.clone());

    let _held: Vec<_> = (0..2)
        .map(|_| state.admission.try_acquire(false).expect("slot"))
        .collect();

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o"}))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>(), json!({"error": "too many requests"}));
}

#[tokio::test]
async fn test_slot_freed_after_release() {
    let upstream = ok_upstream().await;
    let state = build_state(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
            .limits(1, 1)
            .build(),
    );
    let server = test_server(state.clone());

    let held = state.admission.try_acquire(false).expect("slot");
    server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o"}))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    drop(held);
    server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o"}))
        .await
        .assert_status(StatusCode::OK);
    assert_eq!(state.admission.available(false), 1);
}

#[tokio::test]
async fn test_admission_checked_before_routing() {
    let state = build_state(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", "http://127.0.0.1:9")])
            .limits(1, 1)
            .build(),
    );
    let server = test_server(state.clone());

    let _held = state.admission.try_acquire(false).expect("slot");
    server
        .post("/v1/chat/completions")
        .json(&json!({"model": "ghost-model"}))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_pools_are_independent() {
    let upstream = ok_upstream().await;
    let state = build_state(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
            .limits(1, 1)
            .build(),
    );
    let server = test_server(state.clone());

    let non_stream = state.admission.try_acquire(false).expect("slot");

    server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o"}))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o", "stream": true}))
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "data: [DONE]\n\n");

    drop(non_stream);
    let _stream = state.admission.try_acquire(true).expect("slot");
    server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o", "stream": true}))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
    server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o"}))
        .await
        .assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_requests_beyond_ceiling_are_shed() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&upstream)
        .await;

    let proxy = spawn_proxy(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
            .limits(2, 1)
            .build(),
    )
    .await;

    let client = reqwest::Client::new();
    let url = proxy.url("/v1/chat/completions");
    let send = || {
        let request = client.post(&url).json(&json!({"model": "gpt-4o"}));
        async move {
            let response = request.send().await.expect("request");
            let status = response.status();
            let _ = response.bytes().await;
            status
        }
    };

    let (first, second, third) = tokio::join!(send(), send(), send());

    let mut statuses = vec![first.as_u16(), second.as_u16(), third.as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![200, 200, 429]);
    let state = proxy.state.clone();
    assert!(
        wait_until(Duration::from_secs(2), || state.admission.available(false) == 2).await,
        "admission slots were not released"
    );
}
