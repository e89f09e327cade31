//! Waits for an arrays well's QC metrics to appear in the QC store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{State, TaskId, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::{Clock, QcStore, SchedulerContext};

use super::{TaskHandler, Verdict, apply_verdict, expect_kind, task_mut};

const KINDS: &[TaskKindTag] = &[TaskKindTag::WaitForInfiniumMetrics];

pub struct WaitForInfiniumMetricsHandler {
    clock: Arc<dyn Clock>,
    qc: Arc<dyn QcStore>,
}

impl WaitForInfiniumMetricsHandler {
    pub fn new(clock: Arc<dyn Clock>, qc: Arc<dyn QcStore>) -> Self {
        Self { clock, qc }
    }
}

#[async_trait]
impl TaskHandler for WaitForInfiniumMetricsHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        _ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        let task = expect_kind(state, task_id, TaskKindTag::WaitForInfiniumMetrics)?;
        if task.is_terminal() {
            return Ok(());
        }
        let TaskKind::WaitForInfiniumMetrics { vessel_label } = task.kind() else {
            return Ok(());
        };
        let vessel_label = vessel_label.clone();

        let verdict = match self.qc.has_metrics(&vessel_label).await {
            Ok(true) => Verdict::Complete,
            Ok(false) => {
                debug!(task = %task_id, vessel = %vessel_label, "qc metrics not yet available");
                Verdict::Pending
            }
            Err(err) => {
                warn!(task = %task_id, vessel = %vessel_label, error = %err, "qc store lookup failed");
                Verdict::Suspended(err.to_string())
            }
        };
        apply_verdict(task_mut(state, task_id)?, verdict, self.clock.now())
    }
}
