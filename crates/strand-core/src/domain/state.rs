//! Pipeline state: one phase and the tasks it owns.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::observability::StatusCounts;

use super::context::{ArraysWell, SampleContext, SequencingRun};
use super::ids::{StateId, TaskId};
use super::kind::TaskKindTag;
use super::status::TaskStatus;
use super::task::Task;

/// The pipeline phase plus the context it operates over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum Phase {
    Generic,
    Demultiplex {
        runs: Vec<SequencingRun>,
    },
    Alignment {
        sample: SampleContext,
        runs: Vec<SequencingRun>,
    },
    Aggregation {
        sample: SampleContext,
        runs: Vec<SequencingRun>,
        /// Demultiplex `fastq_list.csv` files merged into the aggregation list.
        #[serde(default)]
        fastq_sources: Vec<PathBuf>,
    },
    Fingerprint {
        sample: SampleContext,
    },
    Infinium {
        well: ArraysWell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    Generic,
    Demultiplex,
    Alignment,
    Aggregation,
    Fingerprint,
    Infinium,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseKind::Generic => "Generic",
            PhaseKind::Demultiplex => "Demultiplex",
            PhaseKind::Alignment => "Alignment",
            PhaseKind::Aggregation => "Aggregation",
            PhaseKind::Fingerprint => "Fingerprint",
            PhaseKind::Infinium => "Infinium",
        };
        f.write_str(s)
    }
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Generic => PhaseKind::Generic,
            Phase::Demultiplex { .. } => PhaseKind::Demultiplex,
            Phase::Alignment { .. } => PhaseKind::Alignment,
            Phase::Aggregation { .. } => PhaseKind::Aggregation,
            Phase::Fingerprint { .. } => PhaseKind::Fingerprint,
            Phase::Infinium { .. } => PhaseKind::Infinium,
        }
    }

    pub fn runs(&self) -> &[SequencingRun] {
        match self {
            Phase::Demultiplex { runs }
            | Phase::Alignment { runs, .. }
            | Phase::Aggregation { runs, .. } => runs,
            _ => &[],
        }
    }

    pub fn sample(&self) -> Option<&SampleContext> {
        match self {
            Phase::Alignment { sample, .. }
            | Phase::Aggregation { sample, .. }
            | Phase::Fingerprint { sample } => Some(sample),
            _ => None,
        }
    }
}

/// Aggregate verdict over a state's required tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Satisfied,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    id: StateId,
    name: String,
    phase: Phase,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    exit_task: Option<Task>,
    #[serde(default)]
    entered_at: Option<DateTime<Utc>>,
}

impl State {
    pub fn new(id: StateId, name: impl Into<String>, phase: Phase) -> Self {
        Self {
            id,
            name: name.into(),
            phase,
            tasks: Vec::new(),
            exit_task: None,
            entered_at: None,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn entered_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at
    }

    pub fn mark_entered(&mut self, at: DateTime<Utc>) {
        self.entered_at = Some(at);
    }

    /// Gives every task lacking one a queued time.
    pub fn stamp_queued(&mut self, at: DateTime<Utc>) {
        for task in self.tasks.iter_mut().chain(self.exit_task.iter_mut()) {
            task.stamp_queued(at);
        }
    }

    pub fn add_task(&mut self, task: Task) -> Result<TaskId, EngineError> {
        self.ensure_unique_name(task.name())?;
        let id = task.id();
        self.tasks.push(task);
        Ok(id)
    }

    /// Replaces the exit task. It runs only after every main task is COMPLETE.
    pub fn set_exit_task(&mut self, task: Task) -> Result<TaskId, EngineError> {
        let previous = self.exit_task.take();
        if let Err(err) = self.ensure_unique_name(task.name()) {
            self.exit_task = previous;
            return Err(err);
        }
        let id = task.id();
        self.exit_task = Some(task);
        Ok(id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn exit_task(&self) -> Option<&Task> {
        self.exit_task.as_ref()
    }

    /// Main tasks followed by the exit task.
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().chain(self.exit_task.iter())
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.all_tasks().find(|task| task.id() == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks
            .iter_mut()
            .chain(self.exit_task.iter_mut())
            .find(|task| task.id() == id)
    }

    pub fn find_task_by_name(&self, name: &str) -> Option<&Task> {
        self.all_tasks().find(|task| task.name() == name)
    }

    pub fn is_exit_task(&self, id: TaskId) -> bool {
        self.exit_task.as_ref().is_some_and(|task| task.id() == id)
    }

    pub fn tasks_of_kind(&self, tag: TaskKindTag) -> impl Iterator<Item = &Task> {
        self.all_tasks().filter(move |task| task.tag() == tag)
    }

    pub fn completed_of_kind(&self, tag: TaskKindTag) -> Vec<&Task> {
        self.tasks_of_kind(tag)
            .filter(|task| task.status() == TaskStatus::Complete)
            .collect()
    }

    /// Exactly one COMPLETE task of `tag`, or a fatal cardinality error.
    pub fn single_completed(&self, tag: TaskKindTag) -> Result<&Task, EngineError> {
        let completed = self.completed_of_kind(tag);
        match completed.as_slice() {
            [task] => Ok(*task),
            _ => Err(EngineError::PrerequisiteCardinality {
                kind: tag,
                state: self.name.clone(),
                found: completed.len(),
            }),
        }
    }

    /// Gate for the exit task: required main tasks COMPLETE, optional ones
    /// at least terminal.
    pub fn main_tasks_complete(&self) -> bool {
        self.tasks.iter().all(|task| {
            if task.is_required() {
                task.status() == TaskStatus::Complete
            } else {
                task.is_terminal()
            }
        })
    }

    /// Required tasks are the main tasks not marked optional, plus the exit task.
    pub fn readiness(&self) -> Readiness {
        let required = self
            .tasks
            .iter()
            .filter(|task| task.is_required())
            .chain(self.exit_task.iter());

        let mut pending = false;
        for task in required {
            match task.status() {
                TaskStatus::Failed => return Readiness::Failed,
                TaskStatus::Complete => {}
                _ => pending = true,
            }
        }
        if pending {
            Readiness::Pending
        } else {
            Readiness::Satisfied
        }
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.all_tasks() {
            counts.record(task.status());
        }
        counts
    }

    fn ensure_unique_name(&self, name: &str) -> Result<(), EngineError> {
        let names: HashSet<&str> = self.all_tasks().map(Task::name).collect();
        if names.contains(name) {
            return Err(EngineError::DuplicateTaskName {
                state: self.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kind::{TaskKind, fixtures};
    use chrono::TimeZone;
    use std::path::Path;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn alignment_state() -> State {
        State::new(
            StateId::generate(),
            "align-SM-1",
            Phase::Alignment {
                sample: SampleContext {
                    sample_key: "SM-1".to_string(),
                    gender: None,
                },
                runs: Vec::new(),
            },
        )
    }

    fn finish(state: &mut State, id: TaskId, ok: bool) {
        let task = state.task_mut(id).unwrap();
        task.start(at()).unwrap();
        if ok {
            task.complete(at()).unwrap();
        } else {
            task.fail("exit 1", at()).unwrap();
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut state = alignment_state();
        let root = Path::new("/seq");
        state
            .add_task(Task::new(TaskId::generate(), "align", fixtures::alignment(root)))
            .unwrap();
        let err = state
            .set_exit_task(Task::new(TaskId::generate(), "align", TaskKind::AlignmentMetrics))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTaskName { .. }));
    }

    #[test]
    fn readiness_follows_required_tasks() {
        let mut state = alignment_state();
        let root = Path::new("/seq");
        let align = state
            .add_task(Task::new(TaskId::generate(), "align", fixtures::alignment(root)))
            .unwrap();
        let extra = state
            .add_task(
                Task::new(TaskId::generate(), "extra", fixtures::demultiplex(root)).optional(),
            )
            .unwrap();
        let metrics = state
            .set_exit_task(Task::new(TaskId::generate(), "metrics", TaskKind::AlignmentMetrics))
            .unwrap();

        assert_eq!(state.readiness(), Readiness::Pending);

        finish(&mut state, align, true);
        assert!(!state.main_tasks_complete());
        finish(&mut state, extra, false);
        assert_eq!(state.readiness(), Readiness::Pending);
        assert!(state.main_tasks_complete());

        finish(&mut state, metrics, true);
        assert_eq!(state.readiness(), Readiness::Satisfied);
    }

    #[test]
    fn failed_required_task_fails_the_state() {
        let mut state = alignment_state();
        let align = state
            .add_task(Task::new(
                TaskId::generate(),
                "align",
                fixtures::alignment(Path::new("/seq")),
            ))
            .unwrap();
        finish(&mut state, align, false);
        assert_eq!(state.readiness(), Readiness::Failed);
    }

    #[test]
    fn single_completed_counts_only_matching_complete_tasks() {
        let mut state = alignment_state();
        let root = Path::new("/seq");
        let first = state
            .add_task(Task::new(TaskId::generate(), "a1", fixtures::alignment(root)))
            .unwrap();
        state
            .add_task(Task::new(TaskId::generate(), "demux", fixtures::demultiplex(root)))
            .unwrap();

        assert!(matches!(
            state.single_completed(TaskKindTag::Alignment),
            Err(EngineError::PrerequisiteCardinality { found: 0, .. })
        ));

        finish(&mut state, first, true);
        assert_eq!(state.single_completed(TaskKindTag::Alignment).unwrap().id(), first);

        let second = state
            .add_task(Task::new(TaskId::generate(), "a2", fixtures::alignment(root)))
            .unwrap();
        finish(&mut state, second, true);
        assert!(matches!(
            state.single_completed(TaskKindTag::Alignment),
            Err(EngineError::PrerequisiteCardinality { found: 2, .. })
        ));
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = alignment_state();
        state
            .set_exit_task(Task::new(TaskId::generate(), "metrics", TaskKind::AlignmentMetrics))
            .unwrap();
        state.mark_entered(at());

        let json = serde_json::to_string(&state).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.phase().kind(), PhaseKind::Alignment);
    }
}
