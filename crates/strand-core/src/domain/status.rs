//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
///
/// State transitions:
/// - Queued -> Running -> Complete
/// - Queued -> Running -> Failed
/// - Running -> Suspended -> Running (re-evaluated by a later poll)
/// - Suspended -> Complete | Failed
/// - Queued -> Failed | Suspended (rejected before anything was launched)
///
/// Complete and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, not yet fired.
    Queued,

    /// Fired; executing or awaiting its external condition.
    Running,

    /// Finished successfully.
    Complete,

    /// Finished unsuccessfully. Never retried automatically.
    Failed,

    /// Blocked on a retryable, operator-fixable condition.
    Suspended,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }

    /// Statuses that must carry an error message, and only these.
    pub fn requires_message(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Suspended)
    }

    /// Is `self -> next` a legal move?
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Complete | Failed, _) => false,
            (Queued, Running | Failed | Suspended) => true,
            (Running, Running | Complete | Failed | Suspended) => true,
            (Suspended, Running | Complete | Failed | Suspended) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Suspended => "SUSPENDED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::fire(TaskStatus::Queued, TaskStatus::Running, true)]
    #[case::reject_at_fire(TaskStatus::Queued, TaskStatus::Failed, true)]
    #[case::skip_running(TaskStatus::Queued, TaskStatus::Complete, false)]
    #[case::finish(TaskStatus::Running, TaskStatus::Complete, true)]
    #[case::suspend(TaskStatus::Running, TaskStatus::Suspended, true)]
    #[case::revisit(TaskStatus::Suspended, TaskStatus::Running, true)]
    #[case::back_to_queue(TaskStatus::Running, TaskStatus::Queued, false)]
    #[case::reopen_complete(TaskStatus::Complete, TaskStatus::Running, false)]
    #[case::reopen_failed(TaskStatus::Failed, TaskStatus::Suspended, false)]
    fn transition_table(#[case] from: TaskStatus, #[case] to: TaskStatus, #[case] legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn serializes_in_upper_case() {
        let s = serde_json::to_string(&TaskStatus::Suspended).unwrap();
        assert_eq!(s, "\"SUSPENDED\"");
    }
}
