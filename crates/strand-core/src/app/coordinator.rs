//! Single-state coordinator: one cooperative pass over a state's tasks.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{FireOutcome, PollOutcome, Readiness, State, StateId, TaskId, TaskStatus};
use crate::error::EngineError;
use crate::handlers::{ReviewDecision, ReviewGate};
use crate::observability::StatusCounts;
use crate::ports::{SchedulerContext, StateStore, StoreError};

use super::state_manager::StateManager;
use super::task_manager::TaskManager;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no state store configured")]
    NoStore,
}

/// What one `step` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub entered: bool,
    pub fired: usize,
    pub polled: usize,
    pub readiness: Readiness,
    pub counts: StatusCounts,
    pub awaiting_review: Vec<TaskId>,
    pub stalled: Vec<TaskId>,
}

impl StepReport {
    fn new(state: &State) -> Self {
        Self {
            entered: state.entered_at().is_some(),
            fired: 0,
            polled: 0,
            readiness: state.readiness(),
            counts: state.status_counts(),
            awaiting_review: Vec::new(),
            stalled: Vec::new(),
        }
    }
}

pub struct Coordinator {
    task_manager: TaskManager,
    state_manager: StateManager,
    review_gate: ReviewGate,
    scheduler: Arc<dyn SchedulerContext>,
    store: Option<Arc<dyn StateStore>>,
}

impl Coordinator {
    pub fn new(
        task_manager: TaskManager,
        state_manager: StateManager,
        review_gate: ReviewGate,
        scheduler: Arc<dyn SchedulerContext>,
        store: Option<Arc<dyn StateStore>>,
    ) -> Self {
        Self {
            task_manager,
            state_manager,
            review_gate,
            scheduler,
            store,
        }
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    /// Enters the state if needed, fires queued main tasks, polls the
    /// unsettled ones and, once every main task is COMPLETE, the exit task.
    pub async fn step(&self, state: &mut State) -> Result<StepReport, EngineError> {
        if state.entered_at().is_none() && !self.state_manager.on_enter(state) {
            return Ok(StepReport::new(state));
        }

        let mut report = StepReport::new(state);
        let main: Vec<TaskId> = state.tasks().iter().map(|task| task.id()).collect();
        for task_id in main {
            self.advance(state, task_id, &mut report).await?;
        }
        if state.main_tasks_complete() {
            if let Some(exit) = state.exit_task().map(|task| task.id()) {
                self.advance(state, exit, &mut report).await?;
            }
        }

        report.readiness = state.readiness();
        report.counts = state.status_counts();
        info!(
            state = %state.name(),
            fired = report.fired,
            polled = report.polled,
            readiness = ?report.readiness,
            "step finished"
        );
        Ok(report)
    }

    async fn advance(&self, state: &mut State, task_id: TaskId, report: &mut StepReport) -> Result<(), EngineError> {
        let status = state
            .task(task_id)
            .map(|task| task.status())
            .ok_or(EngineError::UnknownTask(task_id))?;

        match status {
            TaskStatus::Complete | TaskStatus::Failed => return Ok(()),
            TaskStatus::Queued => {
                let task = state.task_mut(task_id).ok_or(EngineError::UnknownTask(task_id))?;
                let outcome = self.task_manager.fire(task).await?;
                report.fired += 1;
                match outcome {
                    FireOutcome::Rejected { .. } => return Ok(()),
                    FireOutcome::AwaitingReview => {
                        report.awaiting_review.push(task_id);
                        return Ok(());
                    }
                    FireOutcome::Launched { .. } | FireOutcome::Armed => {}
                }
            }
            TaskStatus::Running | TaskStatus::Suspended => {}
        }

        let outcome = self
            .task_manager
            .poll(state, task_id, self.scheduler.as_ref())
            .await?;
        report.polled += 1;
        debug!(task = %task_id, outcome = ?outcome, "polled");
        match outcome {
            PollOutcome::AwaitingReview => report.awaiting_review.push(task_id),
            PollOutcome::Stalled => report.stalled.push(task_id),
            _ => {}
        }
        Ok(())
    }

    /// Applies an operator's review decision to a task of `state`.
    pub fn resolve_review(
        &self,
        state: &mut State,
        task_id: TaskId,
        decision: ReviewDecision,
    ) -> Result<(), EngineError> {
        let task = state.task_mut(task_id).ok_or(EngineError::UnknownTask(task_id))?;
        self.review_gate.resolve(task, decision)
    }

    /// Loads, steps and saves one stored state.
    pub async fn run_once(&self, id: StateId) -> Result<StepReport, CoordinatorError> {
        let store = self.store.as_ref().ok_or(CoordinatorError::NoStore)?;
        let mut state = store.load(id).await?;
        let report = self.step(&mut state).await?;
        store.save(&state).await?;
        Ok(report)
    }

    /// Steps every stored state that is still pending.
    pub async fn run_pending(&self) -> Result<Vec<(StateId, StepReport)>, CoordinatorError> {
        let store = self.store.as_ref().ok_or(CoordinatorError::NoStore)?;
        let mut reports = Vec::new();
        for id in store.list().await? {
            let mut state = store.load(id).await?;
            if state.readiness() != Readiness::Pending {
                continue;
            }
            let report = self.step(&mut state).await?;
            store.save(&state).await?;
            reports.push((id, report));
        }
        Ok(reports)
    }
}
