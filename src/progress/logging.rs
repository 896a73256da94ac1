//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BackendResolved { descriptor } => {
                info!(kind = %descriptor.kind, endpoint = %descriptor.base_endpoint, "Backend resolved");
            }
            ProgressEvent::PullStarted { model } => {
                info!(model = %model, "Pulling model");
            }
            ProgressEvent::PullStatus {
                model,
                status,
                completed,
                total,
            } => {
                debug!(model = %model, status = %status, completed, total, "Pull progress");
            }
            ProgressEvent::PullCompleted { model, elapsed } => {
                info!(
                    model = %model,
                    elapsed_ms = elapsed.as_millis(),
                    "Model pull complete"
                );
            }
            ProgressEvent::PullFailed { model, error } => {
                warn!(model = %model, error = %error, "Model pull failed");
            }
        }
    }
}
