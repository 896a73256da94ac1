//! Backend resolution
//!
//! Picks the inference backend for a session in priority order:
//!
//! 1. Local Ollama, unless running in a hosted context
//! 2. The configured remote Ollama host
//! 3. The OpenAI-compatible provider, when a credential is configured
//!
//! The provider is never probed; a bad credential surfaces on the first
//! request as [`ChatError::Unauthorized`].

use super::error::ChatError;
use super::probe::TransportProbe;
use super::types::{BackendDescriptor, ProbeOutcome};
use crate::progress::{ProgressEvent, ProgressHandler};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Facts about the environment the resolver decides on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSignals {
    /// Running on a hosting platform where no local server can exist
    pub hosted: bool,
    pub local_endpoint: String,
    pub remote_endpoint: Option<String>,
    pub provider_endpoint: String,
    /// Whether a provider credential is configured; the value stays in config
    pub provider_credential: bool,
}

pub struct BackendResolver {
    probe: Arc<dyn TransportProbe>,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl BackendResolver {
    pub fn new(probe: Arc<dyn TransportProbe>) -> Self {
        Self {
            probe,
            progress: None,
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    pub async fn resolve(&self, signals: &EnvironmentSignals) -> Result<BackendDescriptor, ChatError> {
        let mut reasons = Vec::new();

        if signals.hosted {
            debug!("Hosted context, skipping local Ollama probe");
            reasons.push(format!(
                "local Ollama at {} skipped in hosted context",
                signals.local_endpoint
            ));
        } else if let Some(descriptor) = self
            .try_ollama(&signals.local_endpoint, |e| BackendDescriptor::local(e), &mut reasons)
            .await
        {
            return Ok(self.selected(descriptor));
        }

        match &signals.remote_endpoint {
            Some(remote) => {
                if let Some(descriptor) = self
                    .try_ollama(remote, |e| BackendDescriptor::remote(e), &mut reasons)
                    .await
                {
                    return Ok(self.selected(descriptor));
                }
            }
            None => debug!("No remote Ollama host configured"),
        }

        if signals.provider_credential {
            return Ok(self.selected(BackendDescriptor::alternate(
                signals.provider_endpoint.clone(),
            )));
        }
        reasons.push("no provider credential configured".to_string());

        warn!("No inference backend available: {}", reasons.join("; "));
        Err(ChatError::NoBackendAvailable { reasons })
    }

    async fn try_ollama(
        &self,
        endpoint: &str,
        describe: fn(String) -> BackendDescriptor,
        reasons: &mut Vec<String>,
    ) -> Option<BackendDescriptor> {
        match self.probe.probe(endpoint).await {
            ProbeOutcome::Healthy => Some(describe(endpoint.to_string())),
            ProbeOutcome::Unreachable(detail) => {
                debug!("Ollama at {} unavailable: {}", endpoint, detail);
                reasons.push(format!("Ollama at {}: {}", endpoint, detail));
                None
            }
        }
    }

    fn selected(&self, descriptor: BackendDescriptor) -> BackendDescriptor {
        info!("Using backend {}", descriptor);
        if let Some(progress) = &self.progress {
            progress.on_progress(&ProgressEvent::BackendResolved {
                descriptor: descriptor.clone(),
            });
        }
        descriptor
    }
}
