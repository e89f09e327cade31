//! Fatal engine errors.
//!
//! These signal a wiring or configuration defect and halt processing of the
//! task or state at hand. Operational conditions (missing files, non-zero
//! exits, loader failures) never appear here; they become a task status plus
//! an error message instead.

use thiserror::Error;

use crate::domain::{PhaseKind, TaskId, TaskKindTag, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("task {task} cannot be fired from status {status}")]
    NotQueued { task: TaskId, status: TaskStatus },

    #[error("handler for {kind} expects a {expected} state, got {actual}")]
    WrongState {
        kind: TaskKindTag,
        expected: PhaseKind,
        actual: PhaseKind,
    },

    #[error("expected exactly one complete {kind} task in state {state}, found {found}")]
    PrerequisiteCardinality {
        kind: TaskKindTag,
        state: String,
        found: usize,
    },

    #[error("task {0} does not belong to this state")]
    UnknownTask(TaskId),

    #[error("handler for {expected} invoked with a {actual} task")]
    WrongTaskKind {
        expected: TaskKindTag,
        actual: TaskKindTag,
    },

    #[error("no sequencing run named {run} in state {state}")]
    RunNotFound { run: String, state: String },

    #[error("illegal transition {from} -> {to} for task {task}")]
    IllegalTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("state {state} already has a task named {name}")]
    DuplicateTaskName { state: String, name: String },
}
