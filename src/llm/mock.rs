use super::backend::{BackendConnector, ChatBackend, FragmentStream, StreamChunk};
use super::error::ChatError;
use super::probe::TransportProbe;
use super::request::WireMessages;
use super::types::{
    normalize_model_name, BackendDescriptor, BackendKind, Capabilities, ModelHandle, ProbeOutcome,
    Provisioning,
};
use crate::progress::{ProgressEvent, ProgressHandler};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A scripted answer to one `open_stream` call
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Streams the fragments, then signals completion
    Fragments(Vec<String>),
    /// Fails before any byte arrives
    ConnectError(ChatError),
    /// Streams the fragments, then fails
    FailAfter(Vec<String>, ChatError),
    /// Streams the fragments, then ends without a completion signal
    Truncated(Vec<String>),
}

impl MockReply {
    pub fn text(fragments: &[&str]) -> Self {
        MockReply::Fragments(fragments.iter().map(|f| f.to_string()).collect())
    }
}

pub struct MockBackend {
    descriptor: BackendDescriptor,
    capabilities: Capabilities,
    models: Mutex<Vec<String>>,
    provisioning: Option<Provisioning>,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<(String, WireMessages)>>,
    ensure_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            capabilities: Capabilities {
                multimodal: true,
                streaming: true,
            },
            models: Mutex::new(Vec::new()),
            provisioning: None,
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            ensure_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_models(self, models: &[&str]) -> Self {
        *self.models.lock().unwrap() = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fixes what `ensure_model` returns instead of checking the catalog
    pub fn with_provisioning(mut self, provisioning: Provisioning) -> Self {
        self.provisioning = Some(provisioning);
        self
    }

    pub fn add_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn add_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        let mut queue = self.replies.lock().unwrap();
        for reply in replies {
            queue.push_back(reply);
        }
    }

    pub fn remove_model(&self, model: &str) {
        let wanted = normalize_model_name(model);
        self.models
            .lock()
            .unwrap()
            .retain(|m| normalize_model_name(m) != wanted);
    }

    pub fn remaining_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Every request sent so far, as `(model, messages)`
    pub fn requests(&self) -> Vec<(String, WireMessages)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn has_model(&self, model: &str) -> bool {
        let wanted = normalize_model_name(model);
        self.models
            .lock()
            .unwrap()
            .iter()
            .any(|m| normalize_model_name(m) == wanted)
    }
}

fn fragments(texts: Vec<String>) -> Vec<Result<StreamChunk, ChatError>> {
    texts.into_iter().map(|t| Ok(StreamChunk::Fragment(t))).collect()
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn capabilities(&self, _model: &str) -> Capabilities {
        self.capabilities
    }

    async fn list_models(&self) -> Vec<ModelHandle> {
        self.models
            .lock()
            .unwrap()
            .iter()
            .map(ModelHandle::available)
            .collect()
    }

    async fn ensure_model(&self, model: &str, progress: &dyn ProgressHandler) -> Provisioning {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);

        let outcome = match &self.provisioning {
            Some(fixed) => fixed.clone(),
            None if self.has_model(model) => Provisioning::AlreadyPresent,
            None => Provisioning::Failed(format!("model '{}' not found", model)),
        };

        match &outcome {
            Provisioning::Pulled => {
                progress.on_progress(&ProgressEvent::PullStarted {
                    model: model.to_string(),
                });
                self.models.lock().unwrap().push(model.to_string());
            }
            Provisioning::Failed(error) => progress.on_progress(&ProgressEvent::PullFailed {
                model: model.to_string(),
                error: error.clone(),
            }),
            _ => {}
        }
        outcome
    }

    async fn verify_model(&self, model: &str) -> ModelHandle {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.has_model(model) || matches!(self.provisioning, Some(Provisioning::Deferred)) {
            ModelHandle::available(model)
        } else {
            ModelHandle::missing(model)
        }
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: WireMessages,
    ) -> Result<FragmentStream, ChatError> {
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), messages));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::stream_failed("MockBackend: no more replies in queue"))?;

        let items = match reply {
            MockReply::ConnectError(error) => return Err(error),
            MockReply::Fragments(texts) => {
                let mut items = fragments(texts);
                items.push(Ok(StreamChunk::Done));
                items
            }
            MockReply::FailAfter(texts, error) => {
                let mut items = fragments(texts);
                items.push(Err(error));
                items
            }
            MockReply::Truncated(texts) => fragments(texts),
        };
        Ok(stream::iter(items).boxed())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("descriptor", &self.descriptor)
            .field("remaining_replies", &self.remaining_replies())
            .finish()
    }
}

/// Probe with scripted outcomes; unknown endpoints are unreachable
#[derive(Debug, Default)]
pub struct MockProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy(self, endpoint: &str) -> Self {
        self.set(endpoint, ProbeOutcome::Healthy);
        self
    }

    pub fn unreachable(self, endpoint: &str, detail: &str) -> Self {
        self.set(endpoint, ProbeOutcome::Unreachable(detail.to_string()));
        self
    }

    /// Changes an outcome after the probe has been handed out
    pub fn set(&self, endpoint: &str, outcome: ProbeOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), outcome);
    }

    /// Probed endpoints, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportProbe for MockProbe {
    async fn probe(&self, endpoint: &str) -> ProbeOutcome {
        self.calls.lock().unwrap().push(endpoint.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::Unreachable("connection refused".to_string()))
    }
}

/// Hands out pre-built mock backends by kind
#[derive(Debug, Default)]
pub struct MockConnector {
    backends: HashMap<BackendKind, Arc<MockBackend>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Arc<MockBackend>) -> Self {
        self.backends.insert(backend.descriptor().kind, backend);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl BackendConnector for MockConnector {
    fn connect(&self, descriptor: &BackendDescriptor) -> Arc<dyn ChatBackend> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.backends.get(&descriptor.kind) {
            Some(backend) => backend.clone(),
            None => Arc::new(MockBackend::new(descriptor.clone())),
        }
    }
}
