//! Chat backend abstraction
//!
//! Every inference backend (local or remote Ollama, OpenAI-compatible
//! provider) is driven through the [`ChatBackend`] trait. The session picks
//! one at startup through a [`BackendConnector`] and never talks to a
//! concrete client directly.

use super::error::ChatError;
use super::ollama::OllamaBackend;
use super::openai_compatible::OpenAiCompatibleBackend;
use super::request::WireMessages;
use super::types::{normalize_model_name, BackendDescriptor, Capabilities, ModelHandle, Provisioning};
use crate::config::ChatConfig;
use crate::progress::ProgressHandler;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// One decoded unit of a chat response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental reply text
    Fragment(String),
    /// The backend signalled the end of the reply
    Done,
}

/// Decoded response body; ends after `Done` or on the first error
pub type FragmentStream = BoxStream<'static, Result<StreamChunk, ChatError>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    /// What the backend accepts for `model`
    fn capabilities(&self, model: &str) -> Capabilities;

    /// Models in the backend's catalog; empty on any failure
    async fn list_models(&self) -> Vec<ModelHandle>;

    /// Makes sure `model` exists, downloading it if the backend can
    ///
    /// This may take minutes and belongs to session setup only.
    async fn ensure_model(&self, model: &str, progress: &dyn ProgressHandler) -> Provisioning;

    /// Cheap availability check used after a failed request
    async fn verify_model(&self, model: &str) -> ModelHandle {
        let wanted = normalize_model_name(model);
        let available = self
            .list_models()
            .await
            .iter()
            .any(|m| normalize_model_name(&m.name) == wanted);
        ModelHandle {
            name: model.to_string(),
            available,
        }
    }

    /// Sends the conversation and returns the decoded reply
    ///
    /// Returns once the response headers arrive; connection and HTTP status
    /// errors are reported here, body errors through the stream.
    async fn open_stream(
        &self,
        model: &str,
        messages: WireMessages,
    ) -> Result<FragmentStream, ChatError>;

    fn name(&self) -> &str;
}

/// Maps a failed HTTP send to the error taxonomy
pub(crate) fn request_error(backend: &BackendDescriptor, e: reqwest::Error) -> ChatError {
    let detail = if e.is_connect() {
        "connection refused".to_string()
    } else if e.is_timeout() {
        "connection timed out".to_string()
    } else {
        format!("request failed: {}", e)
    };
    ChatError::unreachable(&backend.base_endpoint, detail).on_backend(backend.kind)
}

/// Maps a non-success HTTP status on a chat request to the error taxonomy
pub(crate) fn status_error(
    backend: &BackendDescriptor,
    model: &str,
    status: u16,
    body: &str,
) -> ChatError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").map(|e| match e {
                serde_json::Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            })
        })
        .unwrap_or_else(|| body.trim().to_string());

    let error = match status {
        404 if detail.contains("model") => ChatError::provision_failed(model, detail),
        401 | 403 => ChatError::Unauthorized { status, detail },
        502..=504 => ChatError::unreachable(
            &backend.base_endpoint,
            format!("HTTP {}: {}", status, detail),
        ),
        _ => ChatError::stream_failed(format!("HTTP {}: {}", status, detail)),
    };
    error.on_backend(backend.kind)
}

/// Builds a backend for a resolved descriptor
pub trait BackendConnector: Send + Sync {
    fn connect(&self, descriptor: &BackendDescriptor) -> Arc<dyn ChatBackend>;
}

/// Connects to real HTTP backends using the process configuration
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: ChatConfig,
}

impl HttpConnector {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }
}

impl BackendConnector for HttpConnector {
    fn connect(&self, descriptor: &BackendDescriptor) -> Arc<dyn ChatBackend> {
        if descriptor.kind.is_ollama() {
            Arc::new(OllamaBackend::from_config(descriptor.clone(), &self.config))
        } else {
            Arc::new(OpenAiCompatibleBackend::from_config(
                descriptor.clone(),
                &self.config,
            ))
        }
    }
}
