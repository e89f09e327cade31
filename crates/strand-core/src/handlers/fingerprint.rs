//! Scores a fingerprint check and uploads the LOD score.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::kind::FingerprintParams;
use crate::domain::records::{FingerprintScoreRecord, write_records};
use crate::domain::{PhaseKind, State, TaskId, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::{Clock, MetricsSource, SchedulerContext};

use super::upload::{MetricsUploader, RecordUpload};
use super::{TaskHandler, Verdict, apply_verdict, expect_kind, expect_phase, task_mut};

const KINDS: &[TaskKindTag] = &[TaskKindTag::FingerprintUpload];
const SCORE_CONTROL: &str = "fingerprint_score.ctl";

pub struct FingerprintUploadHandler {
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSource>,
    uploader: Arc<MetricsUploader>,
}

impl FingerprintUploadHandler {
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSource>, uploader: Arc<MetricsUploader>) -> Self {
        Self {
            clock,
            metrics,
            uploader,
        }
    }

    async fn evaluate(&self, params: &FingerprintParams, sample_key: &str) -> Verdict {
        for required in [params.summary_file(), params.detail_file()] {
            if !required.is_file() {
                return Verdict::Failed(format!("{} does not exist", required.display()));
            }
        }

        let summary = match self.metrics.fingerprint_summary(&params.summary_file()).await {
            Ok(Some(summary)) => summary,
            Ok(None) => return Verdict::Suspended(format!("No reference fingerprints for {sample_key}")),
            Err(err) => return Verdict::Suspended(err.to_string()),
        };
        let Some(lod_score) = summary.lod_expected_sample else {
            return Verdict::Failed(format!("Failed to create lod score for {sample_key}"));
        };

        let record = FingerprintScoreRecord {
            analysis_name: params.analysis_name().unwrap_or_default(),
            sample_alias: summary.sample_alias,
            snps_compared: summary.snps_compared,
            lod_score,
            scored_at: self.clock.now(),
        };
        let data_file = score_file(params);
        if let Err(err) = write_records(&data_file, &[record]) {
            return Verdict::Suspended(err.to_string());
        }
        info!(sample = sample_key, lod_score, "fingerprint score written");

        self.uploader
            .upload_all(&[RecordUpload::new(data_file, SCORE_CONTROL)])
            .await
            .into_verdict()
    }
}

fn score_file(params: &FingerprintParams) -> PathBuf {
    let mut name = params.output_prefix.clone().into_os_string();
    name.push(".fingerprint_score.dat");
    PathBuf::from(name)
}

#[async_trait]
impl TaskHandler for FingerprintUploadHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        _ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        if expect_kind(state, task_id, TaskKindTag::FingerprintUpload)?.is_terminal() {
            return Ok(());
        }
        expect_phase(state, TaskKindTag::FingerprintUpload, PhaseKind::Fingerprint)?;
        let params = match state.single_completed(TaskKindTag::Fingerprint)?.kind() {
            TaskKind::Fingerprint(params) => params.clone(),
            other => {
                return Err(EngineError::WrongTaskKind {
                    expected: TaskKindTag::Fingerprint,
                    actual: other.tag(),
                });
            }
        };
        let sample_key = state
            .phase()
            .sample()
            .map(|sample| sample.sample_key.clone())
            .unwrap_or_else(|| params.sample_alias.clone());

        let verdict = self.evaluate(&params, &sample_key).await;
        if let Verdict::Failed(message) | Verdict::Suspended(message) = &verdict {
            warn!(state = %state.name(), task = %task_id, reason = %message, "fingerprint not uploaded");
        }
        apply_verdict(task_mut(state, task_id)?, verdict, self.clock.now())
    }
}
