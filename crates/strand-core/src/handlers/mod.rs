//! Task handlers: per-kind post-processing that settles a task's status.
//!
//! A handler runs when a task's external effect has finished (or, for wait
//! and inline kinds, each time the task is polled). Operational problems end
//! up as a status plus message on the task. Only wiring defects come back as
//! `Err(EngineError)`.

pub mod alignment_metrics;
pub mod delete_folder;
pub mod demultiplex_metrics;
pub mod fingerprint;
pub mod process;
pub mod registry;
pub mod review;
pub mod upload;
pub mod wait_for_idat;
pub mod wait_for_metrics;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{PhaseKind, State, Task, TaskId, TaskKindTag, TaskStatus};
use crate::error::EngineError;
use crate::ports::SchedulerContext;

pub use self::alignment_metrics::AlignmentMetricsHandler;
pub use self::delete_folder::DeleteFolderHandler;
pub use self::demultiplex_metrics::DemultiplexMetricsHandler;
pub use self::fingerprint::FingerprintUploadHandler;
pub use self::process::ProcessTaskHandler;
pub use self::registry::{HandlerRegistry, RegistryError};
pub use self::review::{ReviewDecision, ReviewGate};
pub use self::upload::{MetricsUploader, RecordUpload, UploadOutcome};
pub use self::wait_for_idat::WaitForIdatHandler;
pub use self::wait_for_metrics::WaitForInfiniumMetricsHandler;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Kinds this handler is registered for.
    fn kinds(&self) -> &'static [TaskKindTag];

    async fn handle(
        &self,
        state: &mut State,
        task: TaskId,
        ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError>;
}

/// What a handler decided for the task it ran on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Complete,
    Failed(String),
    Suspended(String),
    /// Not done yet. A suspended task goes back to RUNNING.
    Pending,
}

pub(crate) fn apply_verdict(task: &mut Task, verdict: Verdict, now: DateTime<Utc>) -> Result<(), EngineError> {
    match verdict {
        Verdict::Complete => task.complete(now),
        Verdict::Failed(message) => task.fail(message, now),
        Verdict::Suspended(message) => task.suspend(message, now),
        Verdict::Pending if task.status() == TaskStatus::Suspended => task.start(now),
        Verdict::Pending => Ok(()),
    }
}

pub(crate) fn task_mut(state: &mut State, id: TaskId) -> Result<&mut Task, EngineError> {
    state.task_mut(id).ok_or(EngineError::UnknownTask(id))
}

/// The task must exist in `state` and be of kind `expected`.
pub(crate) fn expect_kind(state: &State, id: TaskId, expected: TaskKindTag) -> Result<&Task, EngineError> {
    let task = state.task(id).ok_or(EngineError::UnknownTask(id))?;
    if task.tag() != expected {
        return Err(EngineError::WrongTaskKind {
            expected,
            actual: task.tag(),
        });
    }
    Ok(task)
}

pub(crate) fn expect_phase(state: &State, kind: TaskKindTag, expected: PhaseKind) -> Result<(), EngineError> {
    let actual = state.phase().kind();
    if actual != expected {
        return Err(EngineError::WrongState {
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}
