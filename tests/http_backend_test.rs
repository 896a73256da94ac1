//! HTTP backend tests against a scripted local server
//!
//! Every test starts a `FakeServer` on an ephemeral port and drives a real
//! `ChatSession` (HTTP probe, HTTP connector, reqwest clients) against it.

mod support;

use bytes::Bytes;
use futures_util::StreamExt;
use ollama_chat::config::Credential;
use ollama_chat::llm::{BackendKind, ChatError};
use ollama_chat::progress::{ProgressEvent, ProgressHandler};
use ollama_chat::{ChatConfig, ChatSession, ExecutionContext, StreamEvent};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{closed_endpoint, FakeServer, Route};

fn config(local: &str) -> ChatConfig {
    ChatConfig {
        execution_context: ExecutionContext::Local,
        local_endpoint: local.to_string(),
        remote_endpoint: None,
        model: "llava".to_string(),
        multimodal_override: None,
        stream: true,
        auto_pull: true,
        temperature: None,
        probe_timeout_secs: 2,
        provider_api_key: None,
        provider_base_url: "https://api.openai.com/v1".to_string(),
        provider_model: "gpt-4o-mini".to_string(),
        provider_stream: true,
        provider_vision: true,
        log_level: "info".to_string(),
    }
}

fn tags(models: &[&str]) -> Route {
    let models: Vec<_> = models.iter().map(|name| json!({ "name": name })).collect();
    Route::get("/api/tags").json(json!({ "models": models }))
}

fn png() -> Bytes {
    Bytes::from_static(b"\x89PNG\r\n\x1a\nfake-image-data")
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingHandler {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

async fn session(config: &ChatConfig) -> ChatSession {
    ChatSession::from_config(config, Arc::new(RecordingHandler::default())).await
}

fn fragments(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Fragment(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_ollama_streams_ndjson_split_across_reads() {
    let server = FakeServer::start(vec![
        tags(&["llava:latest"]),
        Route::post("/api/chat").chunks(
            "application/x-ndjson",
            &[
                "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"role\":\"assis",
                "tant\",\"content\":\"lo\"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
            ],
        ),
    ])
    .await;

    let mut session = session(&config(&server.url())).await;
    assert!(session.is_ready(), "setup error: {:?}", session.setup_error());
    assert_eq!(session.descriptor().map(|d| d.kind), Some(BackendKind::LocalDirect));

    let events: Vec<_> = session
        .submit("What is this?", Some(png()))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(fragments(&events), vec!["Hel", "lo"]);
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Completed(turn)) if turn.text() == "Hello"
    ));
    assert_eq!(session.get_transcript().len(), 2);

    let chat = server.requests_to("/api/chat");
    assert_eq!(chat.len(), 1);
    let body = chat[0].json();
    assert_eq!(body["model"], "llava");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "What is this?");
    assert!(body["messages"][0]["images"][0].is_string());
    assert!(server.requests_to("/api/pull").is_empty());
}

#[tokio::test]
async fn test_ollama_non_streaming_reply_is_one_fragment() {
    let server = FakeServer::start(vec![
        tags(&["llava:latest"]),
        Route::post("/api/chat").json(json!({
            "message": { "role": "assistant", "content": "all at once" },
            "done": true
        })),
    ])
    .await;

    let mut config = config(&server.url());
    config.stream = false;
    let mut session = session(&config).await;

    let events: Vec<_> = session.submit("hi", None).await.unwrap().collect().await;
    assert_eq!(fragments(&events), vec!["all at once"]);
    assert!(matches!(events.last(), Some(StreamEvent::Completed(_))));
    assert_eq!(server.requests_to("/api/chat")[0].json()["stream"], false);
}

#[tokio::test]
async fn test_missing_model_is_pulled_with_progress() {
    let server = FakeServer::start(vec![
        tags(&[]),
        Route::post("/api/pull").ndjson(&[
            json!({ "status": "pulling manifest" }),
            json!({ "status": "downloading", "completed": 50, "total": 100 }),
            json!({ "status": "success" }),
        ]),
    ])
    .await;

    let progress = Arc::new(RecordingHandler::default());
    let session = ChatSession::from_config(&config(&server.url()), progress.clone()).await;

    assert!(session.is_ready());
    let pull = server.requests_to("/api/pull");
    assert_eq!(pull.len(), 1);
    assert_eq!(pull[0].json()["model"], "llava");

    let events = progress.events();
    assert!(matches!(events.first(), Some(ProgressEvent::BackendResolved { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::PullStarted { model } if model == "llava")));
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::PullStatus { completed: Some(50), total: Some(100), .. }
    )));
    assert!(matches!(events.last(), Some(ProgressEvent::PullCompleted { .. })));
}

#[tokio::test]
async fn test_pull_error_blocks_session() {
    let server = FakeServer::start(vec![
        tags(&[]),
        Route::post("/api/pull").ndjson(&[
            json!({ "status": "pulling manifest" }),
            json!({ "error": "pull model manifest: file does not exist" }),
        ]),
    ])
    .await;

    let mut session = session(&config(&server.url())).await;
    assert!(!session.is_ready());
    match session.setup_error() {
        Some(ChatError::ProvisionFailed { detail, .. }) => {
            assert!(detail.contains("file does not exist"))
        }
        other => panic!("expected ProvisionFailed, got {:?}", other),
    }

    assert!(session.submit("hi", None).await.is_err());
    assert!(session.get_transcript().is_empty());
    assert_eq!(
        server.requests_to("/api/pull").len(),
        1,
        "submissions never pull"
    );
}

#[tokio::test]
async fn test_ollama_error_line_fails_reply() {
    let server = FakeServer::start(vec![
        tags(&["llava:latest"]),
        Route::post("/api/chat").ndjson(&[
            json!({ "message": { "role": "assistant", "content": "par" }, "done": false }),
            json!({ "error": "model runner has unexpectedly stopped" }),
        ]),
    ])
    .await;

    let mut session = session(&config(&server.url())).await;
    let events: Vec<_> = session.submit("hi", None).await.unwrap().collect().await;

    assert_eq!(fragments(&events), vec!["par"]);
    match events.last() {
        Some(StreamEvent::Failed(ChatError::StreamFailed { detail })) => {
            assert!(detail.contains("unexpectedly stopped"))
        }
        other => panic!("expected StreamFailed, got {:?}", other),
    }
    assert_eq!(session.get_transcript().len(), 1);
}

#[tokio::test]
async fn test_connection_closed_before_done_fails_reply() {
    let server = FakeServer::start(vec![
        tags(&["llava:latest"]),
        Route::post("/api/chat")
            .ndjson(&[json!({ "message": { "role": "assistant", "content": "cut" }, "done": false })])
            .delay(Duration::from_millis(20)),
    ])
    .await;

    let mut session = session(&config(&server.url())).await;
    let result = session.submit("hi", None).await.unwrap().complete().await;

    assert!(matches!(result, Err(ChatError::StreamFailed { .. })));
    assert_eq!(session.get_transcript().len(), 1);
}

#[tokio::test]
async fn test_unknown_model_on_chat_maps_to_provision_failed() {
    let server = FakeServer::start(vec![
        tags(&["llava:latest"]),
        Route::post("/api/chat")
            .status(404)
            .json(json!({ "error": "model \"llava\" not found, try pulling it first" })),
    ])
    .await;

    let mut session = session(&config(&server.url())).await;
    let result = session.submit("hi", None).await.unwrap().complete().await;
    assert!(matches!(result, Err(ChatError::ProvisionFailed { .. })));
}

#[tokio::test]
async fn test_remote_ollama_used_when_local_is_down() {
    let local = closed_endpoint().await;
    let remote = FakeServer::start(vec![
        tags(&["llava:latest"]),
        Route::post("/api/chat").ndjson(&[
            json!({ "message": { "role": "assistant", "content": "remote says hi" }, "done": true }),
        ]),
    ])
    .await;

    let mut config = config(&local);
    config.remote_endpoint = Some(remote.url());
    let mut session = session(&config).await;

    assert_eq!(session.descriptor().map(|d| d.kind), Some(BackendKind::RemoteDirect));
    let reply = session.submit("hi", None).await.unwrap().complete().await.unwrap();
    assert_eq!(reply.text(), "remote says hi");
}

#[tokio::test]
async fn test_provider_streams_server_sent_events() {
    let provider = FakeServer::start(vec![Route::post("/v1/chat/completions").sse(&[
        r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
        r#"{"choices":[{"delta":{"content":"A bar"}}]}"#,
        r#"{"choices":[{"delta":{"content":" chart."}}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ])])
    .await;

    let mut config = config(&closed_endpoint().await);
    config.execution_context = ExecutionContext::Hosted;
    config.provider_base_url = format!("{}/v1", provider.url());
    config.provider_api_key = Some(Credential::new("sk-test"));
    let mut session = session(&config).await;

    assert_eq!(
        session.descriptor().map(|d| d.kind),
        Some(BackendKind::AlternateProvider)
    );

    let events: Vec<_> = session
        .submit("Describe the chart", Some(png()))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(fragments(&events), vec!["A bar", " chart."]);
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Completed(turn)) if turn.text() == "A bar chart."
    ));

    let request = &provider.requests_to("/v1/chat/completions")[0];
    assert_eq!(request.header("authorization"), Some("Bearer sk-test"));
    let body = request.json();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["stream"], true);
    let parts = body["messages"][0]["content"].as_array().unwrap();
    assert!(parts.iter().any(|p| p["type"] == "text"));
    let image = parts.iter().find(|p| p["type"] == "image_url").unwrap();
    assert!(image["image_url"]["url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_provider_rejects_bad_credential() {
    let provider = FakeServer::start(vec![Route::post("/v1/chat/completions")
        .status(401)
        .json(json!({ "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" } }))])
    .await;

    let mut config = config(&closed_endpoint().await);
    config.execution_context = ExecutionContext::Hosted;
    config.provider_base_url = format!("{}/v1", provider.url());
    config.provider_api_key = Some(Credential::new("sk-wrong"));
    let mut session = session(&config).await;

    let result = session.submit("hi", None).await.unwrap().complete().await;
    match result {
        Err(ChatError::Unauthorized { status, detail }) => {
            assert_eq!(status, 401);
            assert!(detail.contains("Incorrect API key"));
        }
        other => panic!("expected Unauthorized, got {:?}", other),
    }
    assert_eq!(session.get_transcript().len(), 1);
}

#[tokio::test]
async fn test_provider_unknown_model_names_provider_setting() {
    let provider = FakeServer::start(vec![Route::post("/v1/chat/completions")
        .status(404)
        .json(json!({ "error": {
            "message": "The model `gpt-4o-mini` does not exist or you do not have access to it.",
            "type": "invalid_request_error",
            "code": "model_not_found"
        } }))])
    .await;

    let mut config = config(&closed_endpoint().await);
    config.execution_context = ExecutionContext::Hosted;
    config.provider_base_url = format!("{}/v1", provider.url());
    config.provider_api_key = Some(Credential::new("sk-test"));
    let mut session = session(&config).await;

    let result = session.submit("hi", None).await.unwrap().complete().await;
    match result {
        Err(err @ ChatError::ProvisionFailed { backend: BackendKind::AlternateProvider, .. }) => {
            let remediation = err.remediation();
            assert!(remediation.contains("OLLAMA_CHAT_PROVIDER_MODEL"), "{}", remediation);
            assert!(!remediation.contains("ollama pull"), "{}", remediation);
        }
        other => panic!("expected provider ProvisionFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nothing_reachable_reports_every_reason() {
    let mut config = config(&closed_endpoint().await);
    config.remote_endpoint = Some(closed_endpoint().await);
    let mut session = session(&config).await;

    match session.submit("hi", None).await.err() {
        Some(ChatError::NoBackendAvailable { reasons }) => {
            assert_eq!(reasons.len(), 3, "reasons: {:?}", reasons);
        }
        other => panic!("expected NoBackendAvailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_reports_status_and_health() {
    use ollama_chat::llm::{HttpProbe, ProbeOutcome, TransportProbe};

    let healthy = FakeServer::start(vec![tags(&[])]).await;
    let overloaded = FakeServer::start(vec![Route::get("/api/tags")
        .status(503)
        .json(json!({ "error": "busy" }))])
    .await;
    let probe = HttpProbe::new(Duration::from_secs(2));

    assert_eq!(probe.probe(&healthy.url()).await, ProbeOutcome::Healthy);
    match probe.probe(&overloaded.url()).await {
        ProbeOutcome::Unreachable(detail) => assert!(detail.contains("503"), "{}", detail),
        other => panic!("expected Unreachable, got {:?}", other),
    }
    assert_eq!(
        probe.probe(&closed_endpoint().await).await,
        ProbeOutcome::Unreachable("connection refused".to_string())
    );
}
