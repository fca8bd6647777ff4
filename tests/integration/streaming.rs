//! Streaming relay integration tests
//!
//! Runs the proxy behind its real server shell so bytes are observed on the
//! wire as they are flushed, against an upstream fed chunk by chunk.

use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::common::{
    endpoint, open_stream, read_exactly, spawn_proxy, wait_until, ChannelUpstream, TestConfig,
};

const EVENTS: [&str; 3] = [
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
    "data: [DONE]\n\n",
];

#[tokio::test]
async fn test_each_event_arrives_before_the_next_is_produced() {
    let upstream = ChannelUpstream::start(Some("text/event-stream")).await;
    let proxy = spawn_proxy(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.base_url)])
            .build(),
    )
    .await;

    let mut response = open_stream(&proxy, "gpt-4o").await;
    assert_eq!(response.status(), 200);

    for event in EVENTS {
        assert!(upstream.send(event));
        let received = read_exactly(&mut response, event.len()).await;
        assert_eq!(String::from_utf8(received).unwrap(), event);
    }

    drop(upstream);
    let rest = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("Timed out waiting for end of stream")
        .expect("Stream failed");
    assert!(rest.is_none());

    let state = proxy.state.clone();
    assert!(wait_until(Duration::from_secs(2), || state.admission.available(true) == 50).await);
}

#[tokio::test]
async fn test_stream_headers_are_set() {
    let upstream = ChannelUpstream::start(Some("text/event-stream; charset=utf-8")).await;
    let proxy = spawn_proxy(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.base_url)])
            .build(),
    )
    .await;

    let response = open_stream(&proxy, "gpt-4o").await;
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream; charset=utf-8");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");
}

#[tokio::test]
async fn test_missing_content_type_defaults_to_event_stream() {
    let upstream = ChannelUpstream::start(None).await;
    let proxy = spawn_proxy(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.base_url)])
            .build(),
    )
    .await;

    let response = open_stream(&proxy, "gpt-4o").await;
    assert_eq!(response.headers()["content-type"], "text/event-stream");
}

#[tokio::test]
async fn test_large_chunk_relayed_intact() {
    let upstream = ChannelUpstream::start(Some("text/event-stream")).await;
    let proxy = spawn_proxy(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.base_url)])
            .build(),
    )
    .await;

    let payload = format!("data: {}\n\n", "x".repeat(10_000));
    let mut response = open_stream(&proxy, "gpt-4o").await;
    assert!(upstream.send(&payload));

    let received = read_exactly(&mut response, payload.len()).await;
    assert_eq!(received.len(), payload.len());
    assert_eq!(String::from_utf8(received).unwrap(), payload);
}

#[tokio::test]
async fn test_client_disconnect_releases_slot() {
    let upstream = ChannelUpstream::start(Some("text/event-stream")).await;
    let proxy = spawn_proxy(
        TestConfig::new()
            .model("gpt-4o", vec![endpoint("a", &upstream.base_url)])
            .limits(10, 1)
            .build(),
    )
    .await;

    let mut response = open_stream(&proxy, "gpt-4o").await;
    assert!(upstream.send(EVENTS[0]));
    read_exactly(&mut response, EVENTS[0].len()).await;
    assert_eq!(proxy.state.admission.available(true), 0);

    drop(response);

    // Writes after the disconnect surface the broken connection to the relay
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while proxy.state.admission.available(true) == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stream slot was not released after client disconnect"
        );
        upstream.send(EVENTS[1]);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(proxy.state.admission.available(true), 1);
}
