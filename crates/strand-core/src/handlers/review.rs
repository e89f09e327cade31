//! Manual review gate. Review tasks are never completed by polling; an
//! operator decision is the only way to settle one.

use std::sync::Arc;

use tracing::info;

use crate::domain::{Task, TaskKindTag, TaskStatus};
use crate::error::EngineError;
use crate::ports::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

pub struct ReviewGate {
    clock: Arc<dyn Clock>,
}

impl ReviewGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Settles a review task. A review still QUEUED is started first.
    pub fn resolve(&self, task: &mut Task, decision: ReviewDecision) -> Result<(), EngineError> {
        if task.tag() != TaskKindTag::WaitForReview {
            return Err(EngineError::WrongTaskKind {
                expected: TaskKindTag::WaitForReview,
                actual: task.tag(),
            });
        }
        let now = self.clock.now();
        if task.status() == TaskStatus::Queued {
            task.stamp_queued(now);
            task.start(now)?;
        }
        info!(task = %task.id(), name = task.name(), ?decision, "review resolved");
        match decision {
            ReviewDecision::Approve => task.complete(now),
            ReviewDecision::Reject { reason } => task.fail(reason, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kind::fixtures;
    use crate::domain::{TaskId, TaskKind};
    use crate::ports::SystemClock;
    use rstest::rstest;
    use std::path::Path;

    fn gate() -> ReviewGate {
        ReviewGate::new(Arc::new(SystemClock))
    }

    #[rstest]
    #[case::approve(ReviewDecision::Approve, TaskStatus::Complete, None)]
    #[case::reject(
        ReviewDecision::Reject { reason: "contaminated".to_string() },
        TaskStatus::Failed,
        Some("contaminated")
    )]
    fn decision_settles_the_review(
        #[case] decision: ReviewDecision,
        #[case] expected: TaskStatus,
        #[case] message: Option<&str>,
    ) {
        let mut task = Task::new(TaskId::generate(), "review", TaskKind::WaitForReview);
        task.start(chrono::Utc::now()).unwrap();

        gate().resolve(&mut task, decision).unwrap();

        assert_eq!(task.status(), expected);
        assert_eq!(task.error_message(), message);
    }

    #[test]
    fn settled_review_cannot_be_reopened() {
        let mut task = Task::new(TaskId::generate(), "review", TaskKind::WaitForReview);
        gate().resolve(&mut task, ReviewDecision::Approve).unwrap();

        let err = gate()
            .resolve(&mut task, ReviewDecision::Reject { reason: "late".to_string() })
            .unwrap_err();

        assert!(matches!(err, EngineError::IllegalTransition { .. }));
        assert_eq!(task.status(), TaskStatus::Complete);
    }

    #[test]
    fn only_review_tasks_are_accepted() {
        let mut task = Task::new(TaskId::generate(), "align", fixtures::alignment(Path::new("/seq")));

        let err = gate().resolve(&mut task, ReviewDecision::Approve).unwrap_err();

        assert_eq!(
            err,
            EngineError::WrongTaskKind {
                expected: TaskKindTag::WaitForReview,
                actual: TaskKindTag::Alignment,
            }
        );
        assert_eq!(task.status(), TaskStatus::Queued);
    }
}
