//! Progress reporting hooks.
//!
//! Callers that show progress (the CLI, a UI) register a callback. Events are
//! informational only; nothing in selection or retry reads them back.

use std::sync::Arc;
use std::time::Duration;

use super::models::{OutcomeKind, TaskType};

/// Something worth telling a waiting user about.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A call to `model` is starting.
    Attempting {
        task: TaskType,
        model: String,
        retry_index: u32,
    },
    /// A call finished.
    AttemptFinished {
        model: String,
        outcome: OutcomeKind,
        duration: Duration,
    },
    /// Waiting for a quota slot or a backoff.
    Waiting { model: String, wait: Duration },
    /// A candidate was passed over without a call.
    Skipped { model: String, reason: String },
    /// A convergence-loop step on a content unit.
    Unit { unit: String, phase: &'static str, detail: String },
}

/// Shared progress callback.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
