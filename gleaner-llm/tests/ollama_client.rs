mod common;

use gleaner_common::settings::LlmSettings;
use gleaner_common::GleanerError;
use gleaner_llm::ensure_llm_ready;
use gleaner_llm::ollama::{OllamaClient, OllamaOptions};
use std::time::Duration;
use gleaner_llm::traits::LlmClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "llama3.2:3b";

fn options(server: &MockServer, pull_missing: bool) -> OllamaOptions {
    OllamaOptions {
        endpoint: server.uri(),
        model: MODEL.to_string(),
        pull_missing,
        request_timeout: Duration::from_secs(5),
    }
}

async fn server_with_model() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": MODEL }] })),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn pulls_missing_model_on_startup() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .and(body_partial_json(json!({ "model": MODEL, "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::connect(options(&server, true))
        .await
        .expect("client");
    assert_eq!(client.model_name(), MODEL);
}

#[tokio::test]
async fn missing_model_without_pull_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = OllamaClient::connect(options(&server, false))
        .await
        .err()
        .expect("model is missing");
    assert!(matches!(err, GleanerError::Summarizer(msg) if msg.contains("ollama pull")));
}

#[tokio::test]
async fn summarize_relevant_sends_both_texts() {
    common::init_test_tracing();
    let server = server_with_model().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": MODEL, "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "  ACME rose 3% on earnings.\n",
            "eval_count": 9
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::connect(options(&server, false))
        .await
        .unwrap();
    let summary = client
        .summarize_relevant("Price: 101.2\nSummary: earnings beat", "Why did ACME move?")
        .await
        .unwrap();
    assert_eq!(summary, "ACME rose 3% on earnings.");

    let requests = server.received_requests().await.unwrap();
    let generate = requests
        .iter()
        .find(|r| r.url.path() == "/api/generate")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&generate.body).unwrap();
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.contains("Why did ACME move?"));
    assert!(prompt.contains("earnings beat"));
    assert!(body["system"].is_string());
    assert_eq!(body["options"]["num_predict"], 400);
}

#[tokio::test]
async fn generate_failure_is_a_summarizer_error() {
    let server = server_with_model().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = OllamaClient::connect(options(&server, false))
        .await
        .unwrap();
    let err = client.summarize_relevant("x", "y").await.unwrap_err();
    assert!(matches!(err, GleanerError::Summarizer(msg) if msg.contains("500")));
}

#[tokio::test]
async fn unreachable_server_is_reported() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = ensure_llm_ready(&LlmSettings::Ollama {
        model: MODEL.into(),
        endpoint: uri,
        pull_missing: true,
        request_timeout_secs: 5,
    })
    .await
    .err()
    .expect("server is gone");
    assert!(matches!(err, GleanerError::Summarizer(_)));
}

#[tokio::test]
async fn no_provider_is_a_config_error() {
    let err = ensure_llm_ready(&LlmSettings::None).await.err().unwrap();
    assert!(matches!(err, GleanerError::Config(_)));
}

#[tokio::test]
async fn health_check_reflects_server_state() {
    let server = server_with_model().await;
    let client = OllamaClient::connect(options(&server, false))
        .await
        .unwrap();
    assert!(client.health_check().await.unwrap());
}
