//! Uploads alignment or aggregation metrics for one sample.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::kind::AlignmentParams;
use crate::domain::metrics::{AlignmentMetrics, ReplayInfo};
use crate::domain::records::{AlignmentSummaryRecord, ReadGroupRecord, VariantCallingRecord, write_records};
use crate::domain::{Phase, PhaseKind, State, TaskId, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::{Clock, MetricsSource, SchedulerContext};

use super::upload::{MetricsUploader, RecordUpload};
use super::{TaskHandler, Verdict, apply_verdict, expect_kind, task_mut};

const KINDS: &[TaskKindTag] = &[TaskKindTag::AlignmentMetrics];

const SUMMARY_CONTROL: &str = "mapping_summary_mercury.ctl";
const READ_GROUP_CONTROL: &str = "mapping_rg_metrics_mercury.ctl";
const VARIANT_CALLING_CONTROL: &str = "vc_metrics_mercury.ctl";

/// Everything the upload needs, copied out of the state.
struct Upload {
    params: AlignmentParams,
    run_name: String,
    run_date: Option<chrono::NaiveDate>,
    sample_alias: String,
    analysis_name: String,
}

pub struct AlignmentMetricsHandler {
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSource>,
    uploader: Arc<MetricsUploader>,
}

impl AlignmentMetricsHandler {
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSource>, uploader: Arc<MetricsUploader>) -> Self {
        Self {
            clock,
            metrics,
            uploader,
        }
    }

    fn prepare(state: &State) -> Result<Upload, EngineError> {
        let prerequisite = match state.phase() {
            Phase::Alignment { .. } => TaskKindTag::Alignment,
            Phase::Aggregation { .. } => TaskKindTag::Aggregation,
            other => {
                return Err(EngineError::WrongState {
                    kind: TaskKindTag::AlignmentMetrics,
                    expected: PhaseKind::Alignment,
                    actual: other.kind(),
                });
            }
        };

        let params = match state.single_completed(prerequisite)?.kind() {
            TaskKind::Alignment(params) | TaskKind::Aggregation(params) => params.clone(),
            other => {
                return Err(EngineError::WrongTaskKind {
                    expected: prerequisite,
                    actual: other.tag(),
                });
            }
        };

        let runs = state.phase().runs();
        let run_name = runs
            .iter()
            .map(|run| run.run_name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let sample_alias = state
            .phase()
            .sample()
            .map(|sample| sample.sample_key.clone())
            .unwrap_or_else(|| params.vc_sample_name.clone());

        Ok(Upload {
            run_name,
            run_date: runs.iter().map(|run| run.run_date).max(),
            sample_alias,
            analysis_name: state.name().to_string(),
            params,
        })
    }

    async fn evaluate(&self, upload: &Upload) -> Verdict {
        let params = &upload.params;
        for required in [
            params.output_dir.clone(),
            params.replay_file(),
            params.mapping_metrics_file(),
        ] {
            if !required.exists() {
                return Verdict::Failed(format!("{} does not exist", required.display()));
            }
        }

        let replay = match self.metrics.replay_info(&params.replay_file()).await {
            Ok(replay) => replay,
            Err(err) => return Verdict::Suspended(err.to_string()),
        };
        let metrics = match self
            .metrics
            .alignment_metrics(&params.output_dir, &params.output_file_prefix)
            .await
        {
            Ok(metrics) => metrics,
            Err(err) => return Verdict::Suspended(err.to_string()),
        };

        let files = RecordFiles::new(&params.output_dir, &params.output_file_prefix);
        if let Err(err) = write_alignment_records(&files, upload, &replay, &metrics) {
            return Verdict::Suspended(err.to_string());
        }
        info!(
            sample = %upload.sample_alias,
            read_groups = metrics.read_groups.len(),
            "alignment records written"
        );

        self.uploader
            .upload_all(&[
                RecordUpload::new(files.summary, SUMMARY_CONTROL),
                RecordUpload::new(files.read_groups, READ_GROUP_CONTROL),
                RecordUpload::new(files.variant_calling, VARIANT_CALLING_CONTROL),
            ])
            .await
            .into_verdict()
    }
}

struct RecordFiles {
    summary: PathBuf,
    read_groups: PathBuf,
    variant_calling: PathBuf,
}

impl RecordFiles {
    fn new(output_dir: &Path, prefix: &str) -> Self {
        Self {
            summary: output_dir.join(format!("{prefix}.mapping_summary_mercury.dat")),
            read_groups: output_dir.join(format!("{prefix}.mapping_rg_metrics_mercury.dat")),
            variant_calling: output_dir.join(format!("{prefix}.vc_metrics_mercury.dat")),
        }
    }
}

fn write_alignment_records(
    files: &RecordFiles,
    upload: &Upload,
    replay: &ReplayInfo,
    metrics: &AlignmentMetrics,
) -> Result<(), crate::domain::records::RecordError> {
    let summary = &metrics.summary;
    write_records(
        &files.summary,
        &[AlignmentSummaryRecord {
            run_name: upload.run_name.clone(),
            run_date: upload.run_date,
            sample_alias: upload.sample_alias.clone(),
            analysis_name: upload.analysis_name.clone(),
            analysis_node: replay.node_name.clone(),
            dragen_version: replay.dragen_version.clone(),
            total_reads: summary.total_reads,
            mapped_reads: summary.mapped_reads,
            duplicate_reads: summary.duplicate_reads,
            mean_coverage: summary.mean_coverage,
            estimated_contamination: summary.estimated_contamination,
            predicted_sex_ploidy: summary.predicted_sex_ploidy.clone(),
        }],
    )?;

    let read_groups: Vec<ReadGroupRecord> = metrics
        .read_groups
        .iter()
        .map(|rg| ReadGroupRecord {
            run_name: upload.run_name.clone(),
            run_date: upload.run_date,
            sample_alias: upload.sample_alias.clone(),
            analysis_name: upload.analysis_name.clone(),
            read_group: rg.read_group.clone(),
            total_reads: rg.total_reads,
            mapped_reads: rg.mapped_reads,
            duplicate_reads: rg.duplicate_reads,
        })
        .collect();
    write_records(&files.read_groups, &read_groups)?;

    let variant_calling: Vec<VariantCallingRecord> = metrics
        .variant_calling
        .iter()
        .map(|vc| VariantCallingRecord {
            run_name: upload.run_name.clone(),
            run_date: upload.run_date,
            sample_alias: upload.sample_alias.clone(),
            analysis_name: upload.analysis_name.clone(),
            prefilter: vc.prefilter,
            snps: vc.snps,
            indels: vc.indels,
            ti_tv_ratio: vc.ti_tv_ratio,
            het_hom_ratio: vc.het_hom_ratio,
        })
        .collect();
    write_records(&files.variant_calling, &variant_calling)
}

#[async_trait]
impl TaskHandler for AlignmentMetricsHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        _ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        if expect_kind(state, task_id, TaskKindTag::AlignmentMetrics)?.is_terminal() {
            return Ok(());
        }
        let upload = Self::prepare(state)?;

        let verdict = self.evaluate(&upload).await;
        if let Verdict::Failed(message) | Verdict::Suspended(message) = &verdict {
            warn!(state = %state.name(), task = %task_id, reason = %message, "alignment metrics not uploaded");
        }
        apply_verdict(task_mut(state, task_id)?, verdict, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::LoaderConfig;
    use crate::domain::kind::fixtures;
    use crate::domain::metrics::{MappingSummary, ReadGroupMapping, VariantCallingSummary};
    use crate::domain::{SampleContext, StateId, Task, TaskStatus};
    use crate::handlers::upload::testing::ScriptedLoader;
    use crate::impls::{InMemoryMetricsSource, StaticSchedulerContext};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn sample() -> SampleContext {
        SampleContext {
            sample_key: "SM-1".to_string(),
            gender: None,
        }
    }

    fn metrics() -> AlignmentMetrics {
        AlignmentMetrics {
            summary: MappingSummary {
                total_reads: 1000,
                mapped_reads: 990,
                duplicate_reads: 50,
                mean_coverage: 31.5,
                estimated_contamination: Some(0.01),
                predicted_sex_ploidy: Some("XX".to_string()),
            },
            read_groups: vec![ReadGroupMapping {
                read_group: "HXYZ_1_SM-1".to_string(),
                total_reads: 1000,
                mapped_reads: 990,
                duplicate_reads: 50,
            }],
            variant_calling: vec![VariantCallingSummary {
                prefilter: true,
                snps: 4_000_000,
                indels: 500_000,
                ti_tv_ratio: Some(2.0),
                het_hom_ratio: Some(1.5),
            }],
        }
    }

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    /// Alignment state with `completed` finished alignment tasks plus one
    /// unrelated demultiplex task, and a running metrics exit task.
    fn alignment_state(root: &Path, completed: usize) -> (State, TaskId) {
        let mut state = State::new(
            StateId::generate(),
            "align-SM-1",
            Phase::Alignment {
                sample: sample(),
                runs: Vec::new(),
            },
        );
        for i in 0..completed.max(1) {
            let id = state
                .add_task(Task::new(TaskId::generate(), format!("align-{i}"), fixtures::alignment(root)))
                .unwrap();
            if i < completed {
                let task = state.task_mut(id).unwrap();
                task.start(at()).unwrap();
                task.complete(at()).unwrap();
            }
        }
        state
            .add_task(Task::new(TaskId::generate(), "demux", fixtures::demultiplex(root)))
            .unwrap();
        let metrics_task = state
            .set_exit_task(Task::new(TaskId::generate(), "alignment-metrics", TaskKind::AlignmentMetrics))
            .unwrap();
        state.task_mut(metrics_task).unwrap().start(at()).unwrap();
        (state, metrics_task)
    }

    fn write_outputs(root: &Path) -> AlignmentParams {
        let params = fixtures::alignment_params(root, "SM-1");
        std::fs::create_dir_all(&params.output_dir).unwrap();
        std::fs::write(params.replay_file(), "{}").unwrap();
        std::fs::write(params.mapping_metrics_file(), "").unwrap();
        params
    }

    fn handler(root: &Path, params: &AlignmentParams, loader: Arc<ScriptedLoader>) -> AlignmentMetricsHandler {
        let source = InMemoryMetricsSource::new()
            .with_replay(
                params.replay_file(),
                ReplayInfo {
                    dragen_version: "3.7.5".to_string(),
                    node_name: "dragen02".to_string(),
                },
            )
            .with_alignment(&params.output_dir, &params.output_file_prefix, metrics());
        let config = LoaderConfig {
            control_dir: root.join("ctl"),
            log_dir: root.join("logs"),
            ..LoaderConfig::default()
        };
        AlignmentMetricsHandler::new(
            Arc::new(FixedClock::new(at())),
            Arc::new(source),
            Arc::new(MetricsUploader::new(loader, config)),
        )
    }

    #[rstest]
    #[case::none_completed(0)]
    #[case::two_completed(2)]
    #[tokio::test]
    async fn prerequisite_cardinality_is_fatal(#[case] completed: usize) {
        let dir = tempfile::tempdir().unwrap();
        let params = write_outputs(dir.path());
        let (mut state, metrics_task) = alignment_state(dir.path(), completed);

        let err = handler(dir.path(), &params, Arc::new(ScriptedLoader::default()))
            .handle(&mut state, metrics_task, &StaticSchedulerContext::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::PrerequisiteCardinality {
                kind: TaskKindTag::Alignment,
                state: "align-SM-1".to_string(),
                found: completed,
            }
        );
        assert_eq!(state.task(metrics_task).unwrap().status(), TaskStatus::Running);
    }

    #[tokio::test]
    async fn one_failed_load_fails_the_task_and_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let params = write_outputs(dir.path());
        let (mut state, metrics_task) = alignment_state(dir.path(), 1);
        let loader = Arc::new(ScriptedLoader::with_exit_codes([0, 1, 0]));

        handler(dir.path(), &params, loader.clone())
            .handle(&mut state, metrics_task, &StaticSchedulerContext::new())
            .await
            .unwrap();

        let task = state.task(metrics_task).unwrap();
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(!task.error_message().unwrap().contains("exit 1"));
        assert_eq!(loader.calls().len(), 3);
        let files = RecordFiles::new(&params.output_dir, "SM-1");
        assert!(files.summary.is_file());
        assert!(files.read_groups.is_file());
        assert!(files.variant_calling.is_file());
    }

    #[tokio::test]
    async fn uploads_three_record_files() {
        let dir = tempfile::tempdir().unwrap();
        let params = write_outputs(dir.path());
        let (mut state, metrics_task) = alignment_state(dir.path(), 1);
        let loader = Arc::new(ScriptedLoader::default());

        handler(dir.path(), &params, loader.clone())
            .handle(&mut state, metrics_task, &StaticSchedulerContext::new())
            .await
            .unwrap();

        assert_eq!(state.task(metrics_task).unwrap().status(), TaskStatus::Complete);
        let summary = std::fs::read_to_string(RecordFiles::new(&params.output_dir, "SM-1").summary).unwrap();
        assert_eq!(summary, ",,SM-1,align-SM-1,dragen02,3.7.5,1000,990,50,31.5,0.01,XX\n");
    }

    #[tokio::test]
    async fn missing_replay_fails_naming_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let params = write_outputs(dir.path());
        std::fs::remove_file(params.replay_file()).unwrap();
        let (mut state, metrics_task) = alignment_state(dir.path(), 1);

        handler(dir.path(), &params, Arc::new(ScriptedLoader::default()))
            .handle(&mut state, metrics_task, &StaticSchedulerContext::new())
            .await
            .unwrap();

        let task = state.task(metrics_task).unwrap();
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.error_message().unwrap().contains("SM-1-replay.json"));
    }

    #[tokio::test]
    async fn wrong_phase_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let params = write_outputs(dir.path());
        let mut state = State::new(StateId::generate(), "fp", Phase::Fingerprint { sample: sample() });
        let metrics_task = state
            .set_exit_task(Task::new(TaskId::generate(), "alignment-metrics", TaskKind::AlignmentMetrics))
            .unwrap();

        let err = handler(dir.path(), &params, Arc::new(ScriptedLoader::default()))
            .handle(&mut state, metrics_task, &StaticSchedulerContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::WrongState { actual: PhaseKind::Fingerprint, .. }));
    }
}
