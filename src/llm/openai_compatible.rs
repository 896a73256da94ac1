//! OpenAI-compatible HTTP client
//!
//! Used as the alternate provider when no Ollama server is reachable. Any
//! service that speaks the `/chat/completions` protocol works; the base URL
//! and credential come from configuration.
//!
//! Streaming replies arrive as server-sent events. Each event carries a
//! `choices[0].delta.content` fragment; the reply ends with a
//! `finish_reason` or the literal `[DONE]` payload.

use super::backend::{request_error, status_error, ChatBackend, FragmentStream, StreamChunk};
use super::error::ChatError;
use super::request::{OpenAiMessage, WireMessages};
use super::types::{BackendDescriptor, Capabilities, ModelHandle, Provisioning};
use crate::config::{ChatConfig, Credential};
use crate::progress::ProgressHandler;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Client for an OpenAI-compatible chat completions API
pub struct OpenAiCompatibleBackend {
    descriptor: BackendDescriptor,
    http_client: Client,
    api_key: Option<Credential>,
    catalog_timeout: Duration,
    stream: bool,
    vision: bool,
    temperature: Option<f32>,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        descriptor: BackendDescriptor,
        api_key: Option<Credential>,
        connect_timeout: Duration,
    ) -> Self {
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
            api_key,
            catalog_timeout: connect_timeout,
            stream: true,
            vision: true,
            temperature: None,
        }
    }

    pub fn from_config(descriptor: BackendDescriptor, config: &ChatConfig) -> Self {
        let mut backend = Self::new(
            descriptor,
            config.provider_api_key.clone(),
            config.probe_timeout(),
        );
        backend.stream = config.provider_stream;
        backend.vision = config.provider_vision;
        backend.temperature = config.temperature;
        backend
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.descriptor.base_endpoint.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose()),
            None => request,
        }
    }
}

/// Turns one SSE payload into stream items
fn event_items(data: &str) -> Vec<Result<StreamChunk, ChatError>> {
    let data = data.trim();
    if data == "[DONE]" {
        return vec![Ok(StreamChunk::Done)];
    }
    if data.is_empty() {
        return Vec::new();
    }

    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![Err(ChatError::stream_failed(format!(
                "malformed event ({}): {}",
                e,
                data.chars().take(200).collect::<String>()
            )))]
        }
    };

    if let Some(err) = chunk.error {
        return vec![Err(ChatError::stream_failed(err.message))];
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        trace!("Skipping event without choices");
        return Vec::new();
    };

    let mut items = Vec::with_capacity(2);
    if let Some(content) = choice.delta.and_then(|d| d.content) {
        if !content.is_empty() {
            items.push(Ok(StreamChunk::Fragment(content)));
        }
    }
    if choice.finish_reason.is_some() {
        items.push(Ok(StreamChunk::Done));
    }
    items
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn capabilities(&self, _model: &str) -> Capabilities {
        Capabilities {
            multimodal: self.vision,
            streaming: self.stream,
        }
    }

    async fn list_models(&self) -> Vec<ModelHandle> {
        let request = self
            .authorize(self.http_client.get(self.url("/models")))
            .timeout(self.catalog_timeout);

        let response = match request.send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Listing provider models failed with status {}", response.status());
                return Vec::new();
            }
            Err(e) => {
                warn!("Cannot list models at {}: {}", self.descriptor.base_endpoint, e);
                return Vec::new();
            }
        };

        match response.json::<ModelList>().await {
            Ok(list) => list
                .data
                .into_iter()
                .map(|m| ModelHandle::available(m.id))
                .collect(),
            Err(e) => {
                warn!("Failed to parse provider model list: {}", e);
                Vec::new()
            }
        }
    }

    async fn ensure_model(&self, model: &str, _progress: &dyn ProgressHandler) -> Provisioning {
        debug!("Provider models cannot be pulled; {} is validated on first request", model);
        Provisioning::Deferred
    }

    async fn verify_model(&self, model: &str) -> ModelHandle {
        ModelHandle::available(model)
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: WireMessages,
    ) -> Result<FragmentStream, ChatError> {
        let messages = match messages {
            WireMessages::OpenAi(messages) => messages,
            WireMessages::Ollama(_) => {
                return Err(ChatError::stream_failed(
                    "request was built for an Ollama backend",
                ))
            }
        };

        let request = CompletionRequest {
            model: model.to_string(),
            messages,
            stream: self.stream,
            temperature: self.temperature,
        };

        debug!(
            "Sending chat request to {}: model={}, messages={}, stream={}",
            self.descriptor.base_endpoint,
            model,
            request.messages.len(),
            request.stream
        );

        let response = self
            .authorize(self.http_client.post(self.url("/chat/completions")))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(&self.descriptor, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Provider returned error status {}: {}", status, body);
            return Err(status_error(&self.descriptor, model, status, &body));
        }

        if self.stream {
            let events = response.bytes_stream().eventsource();
            return Ok(events
                .flat_map(|event| {
                    let items = match event {
                        Ok(event) => event_items(&event.data),
                        Err(e) => vec![Err(ChatError::stream_failed(format!(
                            "connection dropped: {}",
                            e
                        )))],
                    };
                    stream::iter(items)
                })
                .boxed());
        }

        let body: CompletionResponse = response.json().await.map_err(|e| {
            ChatError::stream_failed(format!("failed to read response body: {}", e))
        })?;
        if let Some(err) = body.error {
            return Err(ChatError::stream_failed(err.message));
        }
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(stream::iter(vec![Ok(StreamChunk::Fragment(text)), Ok(StreamChunk::Done)]).boxed())
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

impl fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("descriptor", &self.descriptor)
            .field("api_key", &self.api_key)
            .field("stream", &self.stream)
            .field("vision", &self.vision)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
