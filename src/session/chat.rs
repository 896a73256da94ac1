//! Chat session
//!
//! A [`ChatSession`] owns the transcript and the backend it resolved at
//! startup. It sends the whole conversation on every request and records
//! the assistant's reply once the stream completes.

use super::consumer::ResponseStream;
use super::transcript::Transcript;
use crate::config::ChatConfig;
use crate::llm::{
    BackendConnector, BackendDescriptor, BackendKind, BackendResolver, Capabilities, ChatBackend,
    ChatError, EnvironmentSignals, FragmentStream, HttpConnector, HttpProbe, ModelHandle,
    Provisioning, RequestBuilder, Turn,
};
use crate::progress::ProgressHandler;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Which model to use on each kind of backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Ollama model name
    pub model: String,
    /// Model requested from the alternate provider
    pub provider_model: String,
    /// Pull a missing Ollama model during setup
    pub auto_pull: bool,
}

impl SessionOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            model: config.model.clone(),
            provider_model: config.provider_model.clone(),
            auto_pull: config.auto_pull,
        }
    }

    pub fn model_for(&self, kind: BackendKind) -> &str {
        if kind.is_ollama() {
            &self.model
        } else {
            &self.provider_model
        }
    }
}

struct ActiveBackend {
    backend: Arc<dyn ChatBackend>,
    model: ModelHandle,
}

pub struct ChatSession {
    id: Uuid,
    span: Span,
    signals: EnvironmentSignals,
    resolver: BackendResolver,
    connector: Arc<dyn BackendConnector>,
    options: SessionOptions,
    progress: Arc<dyn ProgressHandler>,
    active: Option<ActiveBackend>,
    setup_error: Option<ChatError>,
    needs_recheck: bool,
    transcript: Transcript,
}

impl ChatSession {
    /// Resolves a backend and makes sure the model is there
    ///
    /// Never fails: when no backend or model is usable the session keeps the
    /// error, reports it through [`ChatSession::setup_error`], and rejects
    /// submissions with it until a later re-resolution succeeds.
    pub async fn start(
        signals: EnvironmentSignals,
        resolver: BackendResolver,
        connector: Arc<dyn BackendConnector>,
        options: SessionOptions,
        progress: Arc<dyn ProgressHandler>,
    ) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("chat_session", id = %id);

        let mut session = Self {
            id,
            span: span.clone(),
            signals,
            resolver,
            connector,
            options,
            progress,
            active: None,
            setup_error: None,
            needs_recheck: false,
            transcript: Transcript::new(),
        };
        session.setup(true).instrument(span).await;
        session
    }

    /// Starts a session against real HTTP backends
    pub async fn from_config(config: &ChatConfig, progress: Arc<dyn ProgressHandler>) -> Self {
        let resolver = BackendResolver::new(Arc::new(HttpProbe::new(config.probe_timeout())))
            .with_progress(progress.clone());
        let connector = Arc::new(HttpConnector::new(config.clone()));

        Self::start(
            config.signals(),
            resolver,
            connector,
            SessionOptions::from_config(config),
            progress,
        )
        .await
    }

    /// Records the user's message and starts the reply
    ///
    /// The returned stream borrows the session mutably, so only one request
    /// can be in flight:
    ///
    /// ```compile_fail
    /// # use ollama_chat::session::ChatSession;
    /// # async fn overlap(session: &mut ChatSession) {
    /// let first = session.submit("one", None).await.unwrap();
    /// let second = session.submit("two", None).await.unwrap();
    /// drop(first);
    /// # }
    /// ```
    ///
    /// Fails without touching the transcript when no backend or model is
    /// usable, after one re-resolution attempt.
    pub async fn submit(
        &mut self,
        text: impl Into<String>,
        image: Option<Bytes>,
    ) -> Result<ResponseStream<'_>, ChatError> {
        if self.needs_recheck || !self.is_ready() {
            self.needs_recheck = false;
            let span = self.span.clone();
            self.setup(false).instrument(span).await;
        }

        if !self.is_ready() {
            return Err(self.unavailable_error());
        }

        self.transcript.append(Turn::user(text, image));
        let span = self.span.clone();
        Ok(ResponseStream::new(self, span))
    }

    /// Owned copy of the conversation so far
    pub fn get_transcript(&self) -> Vec<Turn> {
        self.transcript.snapshot()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn descriptor(&self) -> Option<&BackendDescriptor> {
        self.active.as_ref().map(|a| a.backend.descriptor())
    }

    pub fn model(&self) -> Option<&ModelHandle> {
        self.active.as_ref().map(|a| &a.model)
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.active
            .as_ref()
            .map(|a| a.backend.capabilities(&a.model.name))
    }

    /// Why the session cannot chat right now, if it cannot
    pub fn setup_error(&self) -> Option<&ChatError> {
        self.setup_error.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.model.available)
    }

    /// Runs resolution again, verifying but never pulling the model
    pub async fn reresolve(&mut self) {
        let span = self.span.clone();
        self.setup(false).instrument(span).await;
    }

    async fn setup(&mut self, provision: bool) {
        self.setup_error = None;

        let descriptor = match self.resolver.resolve(&self.signals).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Backend resolution failed: {}", e);
                self.active = None;
                self.setup_error = Some(e);
                return;
            }
        };

        let backend = self.connector.connect(&descriptor);
        let model_name = self.options.model_for(descriptor.kind).to_string();

        let model = if provision && self.options.auto_pull {
            match backend.ensure_model(&model_name, self.progress.as_ref()).await {
                Provisioning::Failed(detail) => {
                    self.setup_error = Some(
                        ChatError::provision_failed(&model_name, detail).on_backend(descriptor.kind),
                    );
                    ModelHandle::missing(&model_name)
                }
                provisioning => {
                    debug!("Model {} ready: {:?}", model_name, provisioning);
                    ModelHandle::available(&model_name)
                }
            }
        } else {
            backend.verify_model(&model_name).await
        };

        if !model.available && self.setup_error.is_none() {
            self.setup_error = Some(
                ChatError::provision_failed(&model_name, format!("not installed on {}", descriptor))
                    .on_backend(descriptor.kind),
            );
        }

        info!(
            "Session using {} with model {} (available: {})",
            descriptor, model.name, model.available
        );
        self.active = Some(ActiveBackend { backend, model });
    }

    fn unavailable_error(&self) -> ChatError {
        self.setup_error
            .clone()
            .unwrap_or_else(|| ChatError::NoBackendAvailable {
                reasons: vec!["backend resolution has not run".to_string()],
            })
    }

    /// Sends the transcript, re-resolving once on a connection failure
    pub(super) async fn open_request(&mut self) -> Result<FragmentStream, ChatError> {
        match self.try_open().await {
            Err(e) if e.is_recoverable() => {
                warn!("{}; re-resolving backend once before giving up", e);
                self.setup(false).await;
                self.try_open().await
            }
            other => other,
        }
    }

    async fn try_open(&self) -> Result<FragmentStream, ChatError> {
        let active = match &self.active {
            Some(active) if active.model.available => active,
            _ => return Err(self.unavailable_error()),
        };

        let capabilities = active.backend.capabilities(&active.model.name);
        let messages = RequestBuilder::build(
            self.transcript.turns(),
            active.backend.descriptor().kind,
            capabilities,
        );
        debug!(
            "Requesting reply from {} ({} messages, {} with images)",
            active.backend.descriptor(),
            messages.len(),
            messages.attachment_count()
        );
        active.backend.open_stream(&active.model.name, messages).await
    }

    pub(super) fn record_reply(&mut self, turn: Turn) {
        self.transcript.append(turn);
    }

    pub(super) fn mark_for_recheck(&mut self) {
        self.needs_recheck = true;
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("backend", &self.descriptor())
            .field("model", &self.model())
            .field("turns", &self.transcript.len())
            .field("needs_recheck", &self.needs_recheck)
            .finish()
    }
}
