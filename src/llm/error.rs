//! Chat error taxonomy
//!
//! Every failure the core can surface to the user is a [`ChatError`]. Each
//! variant maps to a concrete remediation through [`ChatError::remediation`],
//! which the CLI prints alongside the error itself.

use super::types::BackendKind;
use crate::config::{
    ENV_MODEL, ENV_PROVIDER_KEY, ENV_PROVIDER_MODEL, ENV_PROVIDER_URL, ENV_REMOTE_HOST,
};
use thiserror::Error;

/// Errors produced while resolving a backend or running a chat turn
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Connection-level failure; recoverable by re-resolving the backend
    #[error("Cannot reach inference backend at {endpoint}: {detail}")]
    Unreachable {
        backend: BackendKind,
        endpoint: String,
        detail: String,
    },

    /// The model is missing and could not be provisioned
    #[error("Model '{model}' is not available: {detail}")]
    ProvisionFailed {
        backend: BackendKind,
        model: String,
        detail: String,
    },

    /// The response broke off mid-stream or was malformed
    #[error("Response stream failed: {detail}")]
    StreamFailed { detail: String },

    /// No backend passed resolution
    #[error("No inference backend available ({})", reasons.join("; "))]
    NoBackendAvailable { reasons: Vec<String> },

    /// The alternate provider rejected the configured credential
    #[error("Provider rejected the credential (HTTP {status}): {detail}")]
    Unauthorized { status: u16, detail: String },
}

impl ChatError {
    /// Connection failure against an Ollama server; see [`ChatError::on_backend`]
    pub fn unreachable(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        ChatError::Unreachable {
            backend: BackendKind::LocalDirect,
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    /// Missing Ollama model; see [`ChatError::on_backend`]
    pub fn provision_failed(model: impl Into<String>, detail: impl Into<String>) -> Self {
        ChatError::ProvisionFailed {
            backend: BackendKind::LocalDirect,
            model: model.into(),
            detail: detail.into(),
        }
    }

    /// Attributes the error to the backend that produced it
    ///
    /// Only connection and model errors carry a backend; the remediation for
    /// those depends on whether Ollama or the provider was in use.
    pub fn on_backend(mut self, kind: BackendKind) -> Self {
        match &mut self {
            ChatError::Unreachable { backend, .. } | ChatError::ProvisionFailed { backend, .. } => {
                *backend = kind
            }
            _ => {}
        }
        self
    }

    pub fn stream_failed(detail: impl Into<String>) -> Self {
        ChatError::StreamFailed {
            detail: detail.into(),
        }
    }

    /// Whether re-resolving the backend may fix this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::Unreachable { .. })
    }

    /// Actionable instructions for the user
    pub fn remediation(&self) -> String {
        match self {
            ChatError::Unreachable {
                backend: BackendKind::AlternateProvider,
                endpoint,
                ..
            } => format!(
                "Check your network connection and that {} points at the provider (currently {}).",
                ENV_PROVIDER_URL, endpoint
            ),
            ChatError::Unreachable { endpoint, .. } => format!(
                "Start Ollama with `ollama serve` (expected at {}), or set {} to a reachable Ollama server.",
                endpoint, ENV_REMOTE_HOST
            ),
            ChatError::ProvisionFailed {
                backend: BackendKind::AlternateProvider,
                model,
                ..
            } => format!(
                "The provider does not serve '{}'. Set {} to a model your account can use.",
                model, ENV_PROVIDER_MODEL
            ),
            ChatError::ProvisionFailed { model, .. } => format!(
                "Download the model with `ollama pull {}` and try again, or pick another model with {}.",
                model, ENV_MODEL
            ),
            ChatError::StreamFailed { .. } => {
                "The reply was interrupted. Send the message again; if it keeps failing, check the Ollama server log."
                    .to_string()
            }
            ChatError::NoBackendAvailable { .. } => format!(
                "No LLM backend available. Please either:\n\
                 - Start Ollama locally (ollama serve)\n\
                 - Set {} to a reachable Ollama server\n\
                 - Set {} to use the hosted provider",
                ENV_REMOTE_HOST, ENV_PROVIDER_KEY
            ),
            ChatError::Unauthorized { .. } => format!(
                "Check the {} credential; the provider did not accept it.",
                ENV_PROVIDER_KEY
            ),
        }
    }

    /// Error text followed by its remediation, as shown to the user
    pub fn user_message(&self) -> String {
        format!("{}\n{}", self, self.remediation())
    }
}
