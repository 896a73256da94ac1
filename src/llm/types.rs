//! Chat domain types
//!
//! This module defines the types shared by the backends, the resolver and the
//! session: conversation turns, backend descriptors, model handles and the
//! outcomes of probing and provisioning.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    User,
    /// Reply produced by the model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of the conversation
///
/// Fields are private so a turn cannot change after construction; only user
/// turns can carry an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
    image: Option<Bytes>,
}

impl Turn {
    /// Creates a user turn with an optional image attachment
    pub fn user(text: impl Into<String>, image: Option<Bytes>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image,
        }
    }

    /// Creates an assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image(&self) -> Option<&Bytes> {
        self.image.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Kind of inference backend selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Ollama on the local machine
    LocalDirect,
    /// Ollama on a configured remote host
    RemoteDirect,
    /// OpenAI-compatible hosted provider
    AlternateProvider,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalDirect => "local_direct",
            BackendKind::RemoteDirect => "remote_direct",
            BackendKind::AlternateProvider => "alternate_provider",
        }
    }

    /// Whether the backend speaks the Ollama API
    pub fn is_ollama(&self) -> bool {
        matches!(self, BackendKind::LocalDirect | BackendKind::RemoteDirect)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend a session resolved to
///
/// Immutable; re-resolution produces a new descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub base_endpoint: String,
    pub requires_credential: bool,
}

impl BackendDescriptor {
    pub fn local(endpoint: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::LocalDirect,
            base_endpoint: endpoint.into(),
            requires_credential: false,
        }
    }

    pub fn remote(endpoint: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::RemoteDirect,
            base_endpoint: endpoint.into(),
            requires_credential: false,
        }
    }

    pub fn alternate(endpoint: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::AlternateProvider,
            base_endpoint: endpoint.into(),
            requires_credential: true,
        }
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.kind, self.base_endpoint)
    }
}

/// A model name and whether it was available when last checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub name: String,
    pub available: bool,
}

impl ModelHandle {
    pub fn available(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
        }
    }

    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: false,
        }
    }
}

/// What a backend/model pair accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accepts image attachments
    pub multimodal: bool,
    /// Streams replies incrementally
    pub streaming: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            multimodal: false,
            streaming: true,
        }
    }
}

/// Result of a transport probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// Result of making sure a model exists on a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioning {
    /// The model was already in the catalog
    AlreadyPresent,
    /// The model was missing and has been downloaded
    Pulled,
    /// The backend cannot be checked up front; validated on first request
    Deferred,
    /// The model was missing and could not be downloaded
    Failed(String),
}

impl Provisioning {
    pub fn is_ready(&self) -> bool {
        !matches!(self, Provisioning::Failed(_))
    }
}

/// Ollama model names without a tag refer to `:latest`
pub fn normalize_model_name(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{}:latest", name)
    }
}
