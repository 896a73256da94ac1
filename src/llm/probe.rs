//! Transport probe
//!
//! Answers one question: is there a healthy Ollama server at this endpoint?
//! The probe never fails; every problem is folded into
//! [`ProbeOutcome::Unreachable`] with a readable cause.

use super::types::ProbeOutcome;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Introspection path every Ollama server answers
pub const PROBE_PATH: &str = "/api/tags";

/// Upper bound on a single probe
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait TransportProbe: Send + Sync {
    async fn probe(&self, endpoint: &str) -> ProbeOutcome;
}

/// Probes endpoints over HTTP
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http_client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            timeout: timeout.min(MAX_PROBE_TIMEOUT),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl TransportProbe for HttpProbe {
    async fn probe(&self, endpoint: &str) -> ProbeOutcome {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), PROBE_PATH);
        debug!("Probing {}", url);

        match self
            .http_client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("{} is healthy", endpoint);
                ProbeOutcome::Healthy
            }
            Ok(response) => {
                let status = response.status();
                debug!("{} answered with status {}", endpoint, status);
                ProbeOutcome::Unreachable(format!("HTTP {}", status))
            }
            Err(e) => {
                let detail = if e.is_timeout() {
                    format!("timed out after {}s", self.timeout.as_secs())
                } else if e.is_connect() {
                    "connection refused".to_string()
                } else {
                    format!("request failed: {}", e)
                };
                debug!("{} is unreachable: {}", endpoint, detail);
                ProbeOutcome::Unreachable(detail)
            }
        }
    }
}
