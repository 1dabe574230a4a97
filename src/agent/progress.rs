//! Turn progress reporting.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

/// Lifecycle of a reported step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step started.
    InProgress,
    /// The step finished.
    Completed,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Stable step identifier.
    pub step_id: &'static str,
    /// Human-readable description.
    pub description: String,
    /// Step status.
    pub status: StepStatus,
}

/// Step identifiers.
pub mod steps {
    /// Classifying the message.
    pub const CLASSIFICATION: &str = "classification";
    /// Extracting filters.
    pub const EXTRACTION: &str = "extraction";
    /// Running the sub-agents that may retrieve.
    pub const RETRIEVAL: &str = "retrieval";
    /// Writing the reply.
    pub const GENERATION: &str = "generation";
    /// Turn finished.
    pub const COMPLETION: &str = "completion";
}

/// Callback receiving progress events.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Fire-and-forget progress emitter.
///
/// A panicking callback is logged and otherwise ignored.
#[derive(Clone, Default)]
pub struct Progress(Option<ProgressCallback>);

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Progress").field(&self.0.is_some()).finish()
    }
}

impl Progress {
    /// Wraps an optional callback.
    #[must_use]
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self(callback)
    }

    /// Emits a step event.
    pub fn emit(&self, step_id: &'static str, description: impl Into<String>, status: StepStatus) {
        let Some(callback) = &self.0 else {
            return;
        };
        let event = ProgressEvent {
            step_id,
            description: description.into(),
            status,
        };
        if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
            warn!(step = step_id, "progress callback panicked");
        }
    }

    /// Emits an in-progress event.
    pub fn start(&self, step_id: &'static str, description: impl Into<String>) {
        self.emit(step_id, description, StepStatus::InProgress);
    }

    /// Emits a completed event.
    pub fn done(&self, step_id: &'static str, description: impl Into<String>) {
        self.emit(step_id, description, StepStatus::Completed);
    }
}
