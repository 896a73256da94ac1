//! Ollama HTTP client for chat inference
//!
//! Talks to a local or remote Ollama server:
//!
//! - `GET /api/tags` lists installed models
//! - `POST /api/pull` downloads a model, reporting NDJSON progress
//! - `POST /api/chat` streams the reply as NDJSON
//!
//! Requests carry a connect timeout only. Generation on a cold model can
//! take minutes before the first byte, and a pull even longer.

use super::backend::{request_error, status_error, ChatBackend, FragmentStream, StreamChunk};
use super::error::ChatError;
use super::ndjson::decode_lines;
use super::request::{OllamaMessage, WireMessages};
use super::types::{normalize_model_name, BackendDescriptor, Capabilities, ModelHandle, Provisioning};
use crate::config::ChatConfig;
use crate::progress::{ProgressEvent, ProgressHandler};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Model families that accept image input
const VISION_FAMILIES: &[&str] = &[
    "llava",
    "bakllava",
    "llama3.2-vision",
    "llama4",
    "moondream",
    "minicpm-v",
    "gemma3",
    "qwen2.5vl",
    "granite3.2-vision",
    "mistral-small3.1",
];

/// Client for one Ollama server
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools
/// connections.
pub struct OllamaBackend {
    descriptor: BackendDescriptor,
    http_client: Client,
    /// Bound on catalog requests, which should answer as fast as a probe
    catalog_timeout: Duration,
    stream: bool,
    temperature: Option<f32>,
    multimodal_override: Option<bool>,
}

impl OllamaBackend {
    pub fn new(descriptor: BackendDescriptor, connect_timeout: Duration) -> Self {
        let http_client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            descriptor,
            http_client,
            catalog_timeout: connect_timeout,
            stream: true,
            temperature: None,
            multimodal_override: None,
        }
    }

    pub fn from_config(descriptor: BackendDescriptor, config: &ChatConfig) -> Self {
        let mut backend = Self::new(descriptor, config.probe_timeout());
        backend.stream = config.stream;
        backend.temperature = config.temperature;
        backend.multimodal_override = config.multimodal_override;
        backend
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_multimodal(mut self, multimodal: Option<bool>) -> Self {
        self.multimodal_override = multimodal;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.descriptor.base_endpoint.trim_end_matches('/'), path)
    }

    async fn pull(&self, model: &str, progress: &dyn ProgressHandler) -> Result<(), String> {
        let request = PullRequest {
            model: model.to_string(),
            stream: true,
        };

        let response = self
            .http_client
            .post(self.url("/api/pull"))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(&self.descriptor, e).to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body.trim()));
        }

        let mut events = decode_lines::<_, _, PullEvent>(Box::pin(response.bytes_stream()));
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| e.to_string())?;
            if let Some(err) = event.error {
                return Err(err);
            }

            let status = event.status.unwrap_or_default();
            progress.on_progress(&ProgressEvent::PullStatus {
                model: model.to_string(),
                status: status.clone(),
                completed: event.completed,
                total: event.total,
            });

            if status == "success" {
                return Ok(());
            }
        }

        Err("download ended before the server reported success".to_string())
    }
}

/// Whether `model` belongs to a known vision-capable family
pub fn is_vision_model(model: &str) -> bool {
    let base = model.rsplit('/').next().unwrap_or(model);
    let base = base.split(':').next().unwrap_or(base).to_lowercase();
    VISION_FAMILIES.iter().any(|family| base.starts_with(family))
}

fn chunk_items(item: Result<ChatChunk, ChatError>) -> Vec<Result<StreamChunk, ChatError>> {
    let chunk = match item {
        Ok(chunk) => chunk,
        Err(e) => return vec![Err(e)],
    };

    if let Some(err) = chunk.error {
        return vec![Err(ChatError::stream_failed(err))];
    }

    let mut items = Vec::with_capacity(2);
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            items.push(Ok(StreamChunk::Fragment(message.content)));
        }
    }
    if chunk.done {
        items.push(Ok(StreamChunk::Done));
    }
    items
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn capabilities(&self, model: &str) -> Capabilities {
        Capabilities {
            multimodal: self
                .multimodal_override
                .unwrap_or_else(|| is_vision_model(model)),
            streaming: self.stream,
        }
    }

    async fn list_models(&self) -> Vec<ModelHandle> {
        let response = match self
            .http_client
            .get(self.url("/api/tags"))
            .timeout(self.catalog_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Listing models failed with status {}", response.status());
                return Vec::new();
            }
            Err(e) => {
                warn!("Cannot list models at {}: {}", self.descriptor.base_endpoint, e);
                return Vec::new();
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags
                .models
                .into_iter()
                .map(|m| ModelHandle::available(m.name))
                .collect(),
            Err(e) => {
                warn!("Failed to parse model list: {}", e);
                Vec::new()
            }
        }
    }

    async fn ensure_model(&self, model: &str, progress: &dyn ProgressHandler) -> Provisioning {
        let wanted = normalize_model_name(model);
        if self
            .list_models()
            .await
            .iter()
            .any(|m| normalize_model_name(&m.name) == wanted)
        {
            debug!("Model {} already present", model);
            return Provisioning::AlreadyPresent;
        }

        info!("Model {} not found on {}, pulling", model, self.descriptor);
        progress.on_progress(&ProgressEvent::PullStarted {
            model: model.to_string(),
        });
        let start = Instant::now();

        match self.pull(model, progress).await {
            Ok(()) => {
                let elapsed = start.elapsed();
                info!("Pulled {} in {:.1}s", model, elapsed.as_secs_f64());
                progress.on_progress(&ProgressEvent::PullCompleted {
                    model: model.to_string(),
                    elapsed,
                });
                Provisioning::Pulled
            }
            Err(detail) => {
                error!("Pulling {} failed: {}", model, detail);
                progress.on_progress(&ProgressEvent::PullFailed {
                    model: model.to_string(),
                    error: detail.clone(),
                });
                Provisioning::Failed(detail)
            }
        }
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: WireMessages,
    ) -> Result<FragmentStream, ChatError> {
        let messages = match messages {
            WireMessages::Ollama(messages) => messages,
            WireMessages::OpenAi(_) => {
                return Err(ChatError::stream_failed(
                    "request was built for an OpenAI-compatible backend",
                ))
            }
        };

        let request = ChatRequest {
            model: model.to_string(),
            messages,
            stream: self.stream,
            options: self.temperature.map(|temperature| ChatOptions {
                temperature: Some(temperature),
            }),
        };

        debug!(
            "Sending chat request to Ollama: model={}, messages={}, stream={}",
            model,
            request.messages.len(),
            request.stream
        );

        let response = self
            .http_client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(&self.descriptor, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Ollama API returned error status {}: {}", status, body);
            return Err(status_error(&self.descriptor, model, status, &body));
        }

        if self.stream {
            let chunks = decode_lines::<_, _, ChatChunk>(Box::pin(response.bytes_stream()));
            return Ok(chunks
                .flat_map(|item| stream::iter(chunk_items(item)))
                .boxed());
        }

        let body: ChatChunk = response.json().await.map_err(|e| {
            ChatError::stream_failed(format!("failed to read response body: {}", e))
        })?;
        if let Some(err) = body.error {
            return Err(ChatError::stream_failed(err));
        }
        let text = body.message.map(|m| m.content).unwrap_or_default();
        Ok(stream::iter(vec![Ok(StreamChunk::Fragment(text)), Ok(StreamChunk::Done)]).boxed())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

impl fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("descriptor", &self.descriptor)
            .field("stream", &self.stream)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// One line of a `/api/chat` reply
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct PullRequest {
    model: String,
    stream: bool,
}

/// One line of `/api/pull` progress
#[derive(Debug, Deserialize)]
struct PullEvent {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
