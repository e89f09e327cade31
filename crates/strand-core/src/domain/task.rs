//! Task record and status transitions.
//!
//! All status changes go through the transition methods, which enforce the
//! lifecycle in `TaskStatus::can_transition_to` and keep `error_message` set
//! exactly when the task is FAILED or SUSPENDED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::ids::TaskId;
use super::kind::{TaskKind, TaskKindTag};
use super::outcome::TaskResult;
use super::status::TaskStatus;

const DEFAULT_FAILURE: &str = "task failed without a diagnostic";
const DEFAULT_SUSPENSION: &str = "task suspended without a diagnostic";

/// Launch bookkeeping for process tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRun {
    pub external_id: String,
    pub command_line: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    name: String,
    kind: TaskKind,
    status: TaskStatus,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    queued_time: Option<DateTime<Utc>>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    deadline: Option<DateTime<Utc>>,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default)]
    process: Option<ProcessRun>,
    #[serde(default)]
    history: Vec<StatusChange>,
}

fn default_required() -> bool {
    true
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            status: TaskStatus::Queued,
            error_message: None,
            queued_time: None,
            start_time: None,
            end_time: None,
            deadline: None,
            required: true,
            process: None,
            history: Vec::new(),
        }
    }

    pub fn with_queued_time(mut self, at: DateTime<Utc>) -> Self {
        self.queued_time = Some(at);
        self
    }

    /// Excluded from state readiness.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn tag(&self) -> TaskKindTag {
        self.kind.tag()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn queued_time(&self) -> Option<DateTime<Utc>> {
        self.queued_time
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn process(&self) -> Option<&ProcessRun> {
        self.process.as_ref()
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Stamps the queued time if none was set at construction.
    pub fn stamp_queued(&mut self, at: DateTime<Utc>) {
        if self.queued_time.is_none() {
            self.queued_time = Some(at);
        }
    }

    pub fn set_deadline(&mut self, deadline: Option<DateTime<Utc>>) {
        self.deadline = deadline;
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(TaskStatus::Running, None, at)?;
        if self.start_time.is_none() {
            self.start_time = Some(at);
        }
        Ok(())
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(TaskStatus::Complete, None, at)?;
        self.end_time = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), EngineError> {
        let message = non_empty(message.into(), DEFAULT_FAILURE);
        self.transition(TaskStatus::Failed, Some(message), at)?;
        self.end_time = Some(at);
        Ok(())
    }

    pub fn suspend(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), EngineError> {
        let message = non_empty(message.into(), DEFAULT_SUSPENSION);
        self.transition(TaskStatus::Suspended, Some(message), at)
    }

    pub fn record_launch(&mut self, command_line: impl Into<String>, result: &TaskResult) {
        self.process = Some(ProcessRun {
            external_id: result.external_id.clone(),
            command_line: command_line.into(),
            exit_code: None,
            node_name: None,
        });
    }

    pub fn record_exit(&mut self, code: i32) {
        if let Some(process) = self.process.as_mut() {
            process.exit_code = Some(code);
        }
    }

    pub fn record_node(&mut self, node_name: impl Into<String>) {
        if let Some(process) = self.process.as_mut() {
            process.node_name = Some(node_name.into());
        }
    }

    fn transition(
        &mut self,
        to: TaskStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(EngineError::IllegalTransition {
                task: self.id,
                from,
                to,
            });
        }
        if from != to {
            self.history.push(StatusChange { from, to, at });
        }
        self.status = to;
        self.error_message = message;
        Ok(())
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
