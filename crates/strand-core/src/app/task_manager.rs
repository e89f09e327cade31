//! Task Manager: fires tasks, probes their external effects and dispatches
//! finished ones to their handler.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    FireOutcome, PollOutcome, Probe, ProcessStatus, State, Task, TaskClass, TaskId, TaskKind, TaskStatus,
};
use crate::error::EngineError;
use crate::handlers::{HandlerRegistry, Verdict, apply_verdict, task_mut};
use crate::ports::{Clock, ProcessLauncher, SchedulerContext};

pub struct TaskManager {
    launcher: Arc<dyn ProcessLauncher>,
    handlers: HandlerRegistry,
    clock: Arc<dyn Clock>,
    process_deadline: Duration,
    wait_deadline: Option<Duration>,
}

impl TaskManager {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        handlers: HandlerRegistry,
        clock: Arc<dyn Clock>,
        process_deadline: Duration,
        wait_deadline: Option<Duration>,
    ) -> Self {
        Self {
            launcher,
            handlers,
            clock,
            process_deadline,
            wait_deadline,
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Moves a QUEUED task out of the queue.
    ///
    /// Process kinds are dispatched to the launcher; a rejected launch fails
    /// the task and is reported as `FireOutcome::Rejected`, never as `Err`.
    pub async fn fire(&self, task: &mut Task) -> Result<FireOutcome, EngineError> {
        if task.status() != TaskStatus::Queued {
            return Err(EngineError::NotQueued {
                task: task.id(),
                status: task.status(),
            });
        }
        let now = self.clock.now();
        task.stamp_queued(now);

        match task.kind().class() {
            TaskClass::Process => self.launch(task, now).await,
            TaskClass::Wait => {
                task.start(now)?;
                task.set_deadline(self.wait_deadline.map(|deadline| now + deadline));
                debug!(task = %task.id(), name = task.name(), "wait armed");
                Ok(FireOutcome::Armed)
            }
            TaskClass::Inline => {
                task.start(now)?;
                Ok(FireOutcome::Armed)
            }
            TaskClass::ManualGate => {
                task.start(now)?;
                info!(task = %task.id(), name = task.name(), "awaiting manual review");
                Ok(FireOutcome::AwaitingReview)
            }
        }
    }

    async fn launch(&self, task: &mut Task, now: DateTime<Utc>) -> Result<FireOutcome, EngineError> {
        let command = match task.kind().command() {
            Ok(Some(command)) => command,
            Ok(None) => {
                let message = format!("{} has no command to launch", task.tag());
                return reject(task, message, now);
            }
            Err(err) => return reject(task, err.to_string(), now),
        };

        match self.launcher.fire(&command, task).await {
            Ok(result) if result.exit_code == 0 => {
                task.start(now)?;
                task.record_launch(command.render(), &result);
                task.set_deadline(Some(now + self.process_deadline));
                info!(
                    task = %task.id(),
                    name = task.name(),
                    job = %result.external_id,
                    "process launched"
                );
                Ok(FireOutcome::Launched {
                    external_id: result.external_id,
                })
            }
            Ok(result) => {
                let message = format!(
                    "launch of {} returned exit code {}: {}",
                    task.tag(),
                    result.exit_code,
                    result.status_message
                );
                reject(task, message, now)
            }
            Err(err) => reject(task, err.to_string(), now),
        }
    }

    /// Reads the completion signal for `task` without changing it.
    pub async fn probe(&self, task: &Task) -> Probe {
        match task.status() {
            TaskStatus::Complete | TaskStatus::Failed => return Probe::Settled(task.status()),
            TaskStatus::Queued => return Probe::Pending,
            TaskStatus::Running | TaskStatus::Suspended => {}
        }

        match task.kind().class() {
            TaskClass::Process => {
                let Some(run) = task.process() else {
                    return Probe::Lost;
                };
                if let Some(code) = run.exit_code {
                    return Probe::Exited { code };
                }
                match self.launcher.status(&run.external_id).await {
                    ProcessStatus::Running => Probe::Pending,
                    ProcessStatus::Exited { code } => Probe::Exited { code },
                    ProcessStatus::Unknown => Probe::Lost,
                }
            }
            TaskClass::Wait => match task.kind() {
                TaskKind::WaitForFile { path } if path.exists() => Probe::Present,
                TaskKind::WaitForFile { .. } => Probe::Pending,
                _ => Probe::Evaluate,
            },
            TaskClass::Inline => Probe::Evaluate,
            TaskClass::ManualGate => Probe::ManualOnly,
        }
    }

    /// Has the task's external effect finished?
    pub async fn is_complete(&self, task: &Task) -> bool {
        matches!(
            self.probe(task).await,
            Probe::Exited { .. } | Probe::Present | Probe::Settled(TaskStatus::Complete)
        )
    }

    /// One cooperative poll: probe, then hand a finished task to its handler.
    pub async fn poll(
        &self,
        state: &mut State,
        task_id: TaskId,
        ctx: &dyn SchedulerContext,
    ) -> Result<PollOutcome, EngineError> {
        let task = state.task(task_id).ok_or(EngineError::UnknownTask(task_id))?;
        if task.status() == TaskStatus::Queued {
            return Ok(PollOutcome::Pending);
        }
        let probe = self.probe(task).await;
        let now = self.clock.now();

        match probe {
            Probe::Settled(_) => {}
            Probe::ManualOnly => return Ok(PollOutcome::AwaitingReview),
            Probe::Lost => {
                let task = task_mut(state, task_id)?;
                let job = task
                    .process()
                    .map(|run| run.external_id.clone())
                    .unwrap_or_default();
                warn!(task = %task_id, job = %job, "process handle lost");
                task.suspend(format!("process {job} is unknown to the launcher"), now)?;
            }
            Probe::Exited { code } => {
                task_mut(state, task_id)?.record_exit(code);
                self.handle(state, task_id, ctx).await?;
            }
            Probe::Present | Probe::Evaluate => self.handle(state, task_id, ctx).await?,
            Probe::Pending => {
                let task = task_mut(state, task_id)?;
                if task.status() == TaskStatus::Suspended {
                    task.start(now)?;
                }
            }
        }

        let task = state.task(task_id).ok_or(EngineError::UnknownTask(task_id))?;
        Ok(match task.status() {
            TaskStatus::Complete => PollOutcome::Completed,
            TaskStatus::Failed => PollOutcome::Failed(task.error_message().unwrap_or_default().to_string()),
            TaskStatus::Suspended => {
                PollOutcome::Suspended(task.error_message().unwrap_or_default().to_string())
            }
            TaskStatus::Running if task.is_past_deadline(now) => {
                warn!(task = %task_id, name = task.name(), "task stalled past its deadline");
                PollOutcome::Stalled
            }
            TaskStatus::Running | TaskStatus::Queued => PollOutcome::Pending,
        })
    }

    /// Runs the kind's handler. Terminal tasks are left untouched.
    pub async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        let task = state.task(task_id).ok_or(EngineError::UnknownTask(task_id))?;
        if task.is_terminal() {
            return Ok(());
        }
        match self.handlers.get(task.tag()) {
            Some(handler) => handler.handle(state, task_id, ctx).await,
            None => {
                let verdict = default_verdict(task);
                apply_verdict(task_mut(state, task_id)?, verdict, self.clock.now())
            }
        }
    }
}

/// Settles kinds without a registered handler from their raw signal alone.
fn default_verdict(task: &Task) -> Verdict {
    if let Some(code) = task.process().and_then(|run| run.exit_code) {
        return if code == 0 {
            Verdict::Complete
        } else {
            Verdict::Failed(format!("{} exited with code {code}", task.tag()))
        };
    }
    match task.kind() {
        TaskKind::WaitForFile { path } if path.exists() => Verdict::Complete,
        _ => Verdict::Pending,
    }
}

fn reject(task: &mut Task, message: String, now: DateTime<Utc>) -> Result<FireOutcome, EngineError> {
    warn!(task = %task.id(), name = task.name(), reason = %message, "launch rejected");
    task.fail(message, now)?;
    Ok(FireOutcome::Rejected {
        status: task.status(),
        message: task.error_message().unwrap_or_default().to_string(),
    })
}
