#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Full assistant wired to a mocked Ollama HTTP API

use aurora::commands::show_stats;
use aurora::config::{Config, OllamaConfig};
use aurora::memory::StoreBackend;
use aurora::orchestrator::{APOLOGY_MESSAGE, Aurora};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let address = server.address();
    let mut config = Config::load(temp_dir.path()).expect("should load default config");
    config.ollama = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        embedding_model: "test-embed".to_string(),
        chat_model: "test-chat".to_string(),
        timeout_secs: 5,
        ..OllamaConfig::default()
    };
    config.store.backend = StoreBackend::File;
    (config, temp_dir)
}

fn assistant_reply(content: &str) -> serde_json::Value {
    json!({
        "model": "test-chat",
        "message": {"role": "assistant", "content": content},
        "done": true
    })
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "test-embed"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.7, 0.2]]})),
        )
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_runs_stats_tool_against_ollama() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = config_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "test-chat", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-chat",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_knowledge_stats", "arguments": {}}}]
            },
            "done": true
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(assistant_reply("Your knowledge base is empty.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let aurora = Aurora::from_config(&config)
        .await
        .expect("should build assistant");
    let reply = aurora.chat("What do you know?").await;

    assert_eq!(reply, "Your knowledge base is empty.");

    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let followup: serde_json::Value =
        serde_json::from_slice(&requests[1].body).expect("chat request is JSON");
    let messages = followup["messages"].as_array().expect("messages array");
    let tool_message = messages.last().expect("tool result");
    assert_eq!(tool_message["role"], "tool");
    assert_eq!(tool_message["tool_name"], "get_knowledge_stats");
    assert_eq!(
        tool_message["content"],
        "Knowledge base contains 0 chunks of information."
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_then_ask_through_ollama() {
    let server = MockServer::start().await;
    let (config, temp_dir) = config_for(&server);
    mount_embeddings(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(assistant_reply("Above the sink.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let notes = temp_dir.path().join("kitchen.txt");
    fs::write(&notes, "The kettle lives in the cupboard above the sink.")
        .expect("should write notes");

    let aurora = Aurora::from_config(&config)
        .await
        .expect("should build assistant");
    let report = aurora
        .ingest_document(&notes)
        .await
        .expect("should ingest");
    assert_eq!(report.chunks_stored, 1);

    let answer = aurora
        .knowledge()
        .answer("Where is the kettle?")
        .await
        .expect("should answer");
    assert_eq!(answer, "Above the sink.");

    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let chat_request = requests
        .iter()
        .find(|r| r.url.path() == "/api/chat")
        .expect("chat request sent");
    let body: serde_json::Value =
        serde_json::from_slice(&chat_request.body).expect("chat request is JSON");
    let prompt = body["messages"][0]["content"]
        .as_str()
        .expect("prompt text");
    assert!(prompt.contains("Source: kitchen.txt"));
    assert!(prompt.contains("cupboard above the sink"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_model_becomes_apology() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = config_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let aurora = Aurora::from_config(&config)
        .await
        .expect("should build assistant");

    assert_eq!(aurora.chat("hello").await, APOLOGY_MESSAGE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_reports_ollama_health() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = config_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-embed:latest"}, {"name": "test-chat:latest"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    show_stats(&config).await.expect("stats should print");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_survive_a_missing_chat_model() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = config_for(&server);

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-embed:latest"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    show_stats(&config)
        .await
        .expect("a missing model is reported, not fatal");
}
