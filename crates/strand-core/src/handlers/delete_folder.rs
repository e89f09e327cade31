//! Deletes an analysis folder once its retention window has passed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{RetentionWindow, State, TaskId, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::{Clock, SchedulerContext};

use super::{TaskHandler, Verdict, apply_verdict, expect_kind, task_mut};

const KINDS: &[TaskKindTag] = &[TaskKindTag::DeleteFolder];

pub struct DeleteFolderHandler {
    clock: Arc<dyn Clock>,
    retention: RetentionWindow,
}

impl DeleteFolderHandler {
    pub fn new(clock: Arc<dyn Clock>, retention: RetentionWindow) -> Self {
        Self { clock, retention }
    }

    fn evaluate(&self, path: &Path, queued_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Verdict {
        if !path.exists() {
            return Verdict::Suspended(format!("Folder {} doesn't exist", path.display()));
        }
        if !path.is_dir() {
            return Verdict::Suspended(format!("{} is not a directory", path.display()));
        }
        let Some(queued_time) = queued_time else {
            return Verdict::Suspended(format!("No queued time to age {} from", path.display()));
        };

        let last_modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(err) => {
                return Verdict::Suspended(format!(
                    "Failed to read modification time of {}: {err}",
                    path.display()
                ));
            }
        };

        if !self.retention.has_expired(queued_time, last_modified, now) {
            debug!(
                path = %path.display(),
                cutoff = %self.retention.cutoff(queued_time, last_modified),
                "folder retained"
            );
            return Verdict::Pending;
        }
        match fs::remove_dir_all(path) {
            Ok(()) => {
                info!(path = %path.display(), "folder deleted");
                Verdict::Complete
            }
            Err(err) => Verdict::Suspended(format!("Failed to delete {}: {err}", path.display())),
        }
    }
}

#[async_trait]
impl TaskHandler for DeleteFolderHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        _ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        let task = expect_kind(state, task_id, TaskKindTag::DeleteFolder)?;
        if task.is_terminal() {
            return Ok(());
        }
        let TaskKind::DeleteFolder { path } = task.kind() else {
            return Ok(());
        };

        let now = self.clock.now();
        let verdict = self.evaluate(path, task.queued_time(), now);
        apply_verdict(task_mut(state, task_id)?, verdict, now)
    }
}
