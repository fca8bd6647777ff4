//! Models endpoint integration tests
//!
//! The listing is built from the registry alone: no upstream is contacted
//! and no admission slot is taken.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use wiremock::{matchers::any, Mock, MockServer, ResponseTemplate};

use model_proxy::routes::models::ModelsResponse;

use crate::common::{build_state, endpoint, test_server, TestConfig};

async fn silent_upstream() -> MockServer {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    upstream
}

fn ids(response: &ModelsResponse) -> Vec<&str> {
    response.data.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn test_list_models_only_routable() {
    let upstream = silent_upstream().await;
    let config = TestConfig::new()
        .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
        .model("claude-3", vec![endpoint("b", &upstream.uri())])
        .model("ghost", vec![endpoint("broken", "")])
        .build();
    let server = test_server(build_state(config));

    let response = server.get("/v1/models").await;
    response.assert_status(StatusCode::OK);

    let models: ModelsResponse = response.json();
    assert_eq!(models.object, "list");
    assert_eq!(ids(&models), vec!["claude-3", "gpt-4o"]);
    for model in &models.data {
        assert_eq!(model.object, "model");
        assert_eq!(model.owned_by, "proxy");
        assert!(model.created > 0);
    }
}

#[tokio::test]
async fn test_models_subpath_returns_listing() {
    let upstream = silent_upstream().await;
    let config = TestConfig::new()
        .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
        .build();
    let server = test_server(build_state(config));

    let response = server.get("/v1/models/gpt-4o").await;
    response.assert_status(StatusCode::OK);
    let models: ModelsResponse = response.json();
    assert_eq!(ids(&models), vec!["gpt-4o"]);
}

#[tokio::test]
async fn test_models_served_while_admission_exhausted() {
    let upstream = silent_upstream().await;
    let config = TestConfig::new()
        .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
        .limits(1, 1)
        .build();
    let state = build_state(config);
    let server = test_server(state.clone());

    let _non_stream = state.admission.try_acquire(false).expect("slot");
    let _stream = state.admission.try_acquire(true).expect("slot");

    let response = server.get("/v1/models").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(ids(&response.json::<ModelsResponse>()), vec!["gpt-4o"]);
}

#[tokio::test]
async fn test_models_under_custom_prefix() {
    let upstream = silent_upstream().await;
    let config = TestConfig::new()
        .model("gpt-4o", vec![endpoint("a", &upstream.uri())])
        .prefix("/openai/")
        .build();
    let server = test_server(build_state(config));

    let response = server.get("/openai/models").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(ids(&response.json::<ModelsResponse>()), vec!["gpt-4o"]);
}

#[tokio::test]
async fn test_model_with_only_invalid_endpoints_is_not_listed_or_routed() {
    let upstream = silent_upstream().await;
    let mut broken = endpoint("shared", "");
    broken.api_key = String::new();

    let config = TestConfig::new()
        .model("gpt-4o", vec![endpoint("shared", &upstream.uri())])
        .model("ghost", vec![broken])
        .build();
    let server = test_server(build_state(config));

    let response = server.get("/v1/models").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(ids(&response.json::<ModelsResponse>()), vec!["gpt-4o"]);

    server
        .post("/v1/chat/completions")
        .json(&serde_json::json!({"model": "ghost"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
