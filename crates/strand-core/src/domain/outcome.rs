//! Results reported by launches and polls.

use serde::{Deserialize, Serialize};

use super::status::TaskStatus;

/// What the launcher reports at fire time. Transient, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub external_id: String,
    pub status_message: String,
    pub exit_code: i32,
}

impl TaskResult {
    pub fn new(external_id: impl Into<String>, status_message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            external_id: external_id.into(),
            status_message: status_message.into(),
            exit_code,
        }
    }
}

/// Liveness of an external process as reported by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited { code: i32 },
    /// The launcher has no record of the handle (e.g. after a restart).
    Unknown,
}

/// Raw completion signal for one task, before any handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// External effect not finished yet.
    Pending,
    /// Process finished with this exit code.
    Exited { code: i32 },
    /// Awaited file is present.
    Present,
    /// Completion is decided by the kind's handler.
    Evaluate,
    /// Only a human decision can finish this task.
    ManualOnly,
    /// The process handle is gone.
    Lost,
    /// Task is already terminal; nothing to probe.
    Settled(TaskStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Process dispatched with this external id.
    Launched { external_id: String },
    /// Nothing to launch; the task is now eligible for polling.
    Armed,
    /// Manual gate. The driver should pause automatic advancement.
    AwaitingReview,
    /// Rejected before launch; the task is FAILED or SUSPENDED.
    Rejected { status: TaskStatus, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Completed,
    Failed(String),
    Suspended(String),
    /// Still pending after its deadline. Status and message are unchanged.
    Stalled,
    AwaitingReview,
}

impl PollOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, PollOutcome::Completed | PollOutcome::Failed(_))
    }
}
