//! Post-handler for process kinds: exit code, output directory, provenance.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{State, TaskId, TaskKindTag, TaskStatus};
use crate::error::EngineError;
use crate::ports::{Clock, SchedulerContext};

use super::{TaskHandler, Verdict, apply_verdict, task_mut};

const PROCESS_KINDS: &[TaskKindTag] = &[
    TaskKindTag::Demultiplex,
    TaskKindTag::Alignment,
    TaskKindTag::Aggregation,
    TaskKindTag::Fingerprint,
    TaskKindTag::PushIdatsToCloud,
    TaskKindTag::Compute,
];

pub struct ProcessTaskHandler {
    clock: Arc<dyn Clock>,
}

impl ProcessTaskHandler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl TaskHandler for ProcessTaskHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        PROCESS_KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        let task = state.task(task_id).ok_or(EngineError::UnknownTask(task_id))?;
        if task.is_terminal() {
            return Ok(());
        }
        if !PROCESS_KINDS.contains(&task.tag()) {
            return Err(EngineError::WrongTaskKind {
                expected: TaskKindTag::Demultiplex,
                actual: task.tag(),
            });
        }
        let run = task.process().cloned();

        let verdict = match run.as_ref().and_then(|run| run.exit_code) {
            None => Verdict::Failed(format!("{} finished without a recorded exit code", task.tag())),
            Some(code) if code != 0 => {
                Verdict::Failed(format!("{} exited with code {code}", task.tag()))
            }
            Some(_) => match task.kind().output_dir() {
                Some(dir) if !dir.is_dir() => {
                    Verdict::Failed(format!("output directory {} does not exist", dir.display()))
                }
                _ => Verdict::Complete,
            },
        };

        let mut node_name = None;
        if verdict == Verdict::Complete {
            if let Some(run) = run.as_ref() {
                match ctx.resolve_host(&run.external_id).await {
                    Some(host) => node_name = Some(host.node_name),
                    None => warn!(task = %task_id, job = %run.external_id, "execution host unknown"),
                }
            }
        }

        let task = task_mut(state, task_id)?;
        apply_verdict(task, verdict, self.clock.now())?;
        if task.status() == TaskStatus::Complete {
            if let Some(node_name) = node_name {
                task.record_node(node_name);
            }
            info!(task = %task_id, name = task.name(), "process finished");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kind::fixtures;
    use crate::domain::{Phase, Task, TaskKind, TaskResult};
    use crate::impls::StaticSchedulerContext;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn handler() -> ProcessTaskHandler {
        ProcessTaskHandler::new(Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        )))
    }

    fn exited_state(root: &std::path::Path, code: i32) -> (State, TaskId) {
        let mut state = State::new(crate::domain::StateId::generate(), "demux-1", Phase::Generic);
        let mut task = Task::new(TaskId::generate(), "demux", fixtures::demultiplex(root));
        let now = Utc::now();
        task.start(now).unwrap();
        task.record_launch("dragen", &TaskResult::new("77", "Success", 0));
        task.record_exit(code);
        let id = state.add_task(task).unwrap();
        (state, id)
    }

    #[rstest]
    #[case::clean_exit(0, true, TaskStatus::Complete)]
    #[case::non_zero_exit(1, true, TaskStatus::Failed)]
    #[case::missing_output(0, false, TaskStatus::Failed)]
    #[tokio::test]
    async fn settles_from_exit_and_outputs(
        #[case] code: i32,
        #[case] create_output: bool,
        #[case] expected: TaskStatus,
    ) {
        let dir = tempfile::tempdir().unwrap();
        if create_output {
            std::fs::create_dir_all(dir.path().join("demux")).unwrap();
        }
        let (mut state, id) = exited_state(dir.path(), code);
        let ctx = StaticSchedulerContext::single_node("dragen03");

        handler().handle(&mut state, id, &ctx).await.unwrap();

        let task = state.task(id).unwrap();
        assert_eq!(task.status(), expected);
        if expected == TaskStatus::Complete {
            assert_eq!(task.process().unwrap().node_name.as_deref(), Some("dragen03"));
        } else {
            assert!(task.error_message().is_some());
        }
    }

    #[tokio::test]
    async fn missing_output_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let (mut state, id) = exited_state(dir.path(), 0);

        handler()
            .handle(&mut state, id, &StaticSchedulerContext::new())
            .await
            .unwrap();

        let message = state.task(id).unwrap().error_message().unwrap().to_string();
        assert!(message.contains(&dir.path().join("demux").display().to_string()));
    }

    #[tokio::test]
    async fn settled_tasks_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("demux")).unwrap();
        let (mut state, id) = exited_state(dir.path(), 0);
        handler()
            .handle(&mut state, id, &StaticSchedulerContext::new())
            .await
            .unwrap();
        let before = state.task(id).unwrap().clone();

        handler()
            .handle(&mut state, id, &StaticSchedulerContext::single_node("other"))
            .await
            .unwrap();

        let after = state.task(id).unwrap();
        assert_eq!(after.status(), TaskStatus::Complete);
        assert_eq!(after.process().unwrap().node_name, None);
        assert_eq!(after, &before);
    }

    #[tokio::test]
    async fn non_process_kinds_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::new(crate::domain::StateId::generate(), "wait", Phase::Generic);
        let mut task = Task::new(
            TaskId::generate(),
            "marker",
            TaskKind::WaitForFile {
                path: dir.path().join("done"),
            },
        );
        task.start(Utc::now()).unwrap();
        let id = state.add_task(task).unwrap();

        let err = handler()
            .handle(&mut state, id, &StaticSchedulerContext::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::WrongTaskKind {
                actual: TaskKindTag::WaitForFile,
                ..
            }
        ));
        assert_eq!(state.task(id).unwrap().status(), TaskStatus::Running);
    }
}
