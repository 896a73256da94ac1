//! Progress handler trait and events

use crate::llm::BackendDescriptor;
use std::time::Duration;

/// Events emitted while a session is being set up
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The resolver picked a backend
    BackendResolved { descriptor: BackendDescriptor },

    /// A model download started
    PullStarted { model: String },

    /// A status line from the download, with byte counts when known
    PullStatus {
        model: String,
        status: String,
        completed: Option<u64>,
        total: Option<u64>,
    },

    /// The download finished
    PullCompleted { model: String, elapsed: Duration },

    /// The download failed
    PullFailed { model: String, error: String },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
