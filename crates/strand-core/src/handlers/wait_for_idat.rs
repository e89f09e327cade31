//! Waits for both scanner images of an arrays well.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{ArraysWell, State, TaskId, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::{Clock, SchedulerContext};

use super::{TaskHandler, Verdict, apply_verdict, expect_kind, task_mut};

const KINDS: &[TaskKindTag] = &[TaskKindTag::WaitForIdat];

pub struct WaitForIdatHandler {
    clock: Arc<dyn Clock>,
    data_path: PathBuf,
}

impl WaitForIdatHandler {
    pub fn new(clock: Arc<dyn Clock>, data_path: impl Into<PathBuf>) -> Self {
        Self {
            clock,
            data_path: data_path.into(),
        }
    }
}

#[async_trait]
impl TaskHandler for WaitForIdatHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        _ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        let task = expect_kind(state, task_id, TaskKindTag::WaitForIdat)?;
        if task.is_terminal() {
            return Ok(());
        }
        let TaskKind::WaitForIdat {
            chip_barcode,
            position,
        } = task.kind()
        else {
            return Ok(());
        };
        let well = ArraysWell {
            chip_barcode: chip_barcode.clone(),
            position: position.clone(),
            vessel_label: String::new(),
        };

        let files = well.idat_files(&self.data_path);
        let verdict = if files.iter().all(|file| file.is_file()) {
            Verdict::Complete
        } else {
            debug!(task = %task_id, chip = %chip_barcode, position = %position, "idat files not yet present");
            Verdict::Pending
        };
        apply_verdict(task_mut(state, task_id)?, verdict, self.clock.now())
    }
}
