//! Uploads per-sample and per-lane demultiplexing metrics.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::context::parse_read_group;
use crate::domain::kind::DemultiplexParams;
use crate::domain::metrics::{DemultiplexStat, ReplayInfo};
use crate::domain::records::{DemultiplexLaneRecord, DemultiplexSampleRecord, write_records};
use crate::domain::{PhaseKind, SequencingRun, State, TaskId, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::{Clock, MetricsSource, SchedulerContext};

use super::upload::{MetricsUploader, RecordUpload};
use super::{TaskHandler, Verdict, apply_verdict, expect_kind, expect_phase, task_mut};

const KINDS: &[TaskKindTag] = &[TaskKindTag::DemultiplexMetrics];

const SAMPLE_RECORDS: &str = "demultiplex_metrics.dat";
const LANE_RECORDS: &str = "demultiplex_lane_metrics.dat";
const SAMPLE_CONTROL: &str = "demultiplex_metric.ctl";
const LANE_CONTROL: &str = "demultiplex_lane_metric.ctl";

/// One completed demultiplex task matched to the run it processed.
struct Job {
    params: DemultiplexParams,
    run: SequencingRun,
}

impl Job {
    fn stats_file(&self) -> PathBuf {
        self.params
            .output_dir
            .join("Reports")
            .join("Demultiplex_Stats.csv")
    }

    fn replay_file(&self) -> PathBuf {
        self.params.output_dir.join("replay.json")
    }

    fn analysis_name(&self) -> String {
        self.params
            .output_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub struct DemultiplexMetricsHandler {
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSource>,
    uploader: Arc<MetricsUploader>,
}

impl DemultiplexMetricsHandler {
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSource>, uploader: Arc<MetricsUploader>) -> Self {
        Self {
            clock,
            metrics,
            uploader,
        }
    }

    fn jobs(state: &State) -> Result<Vec<Job>, EngineError> {
        let completed = state.completed_of_kind(TaskKindTag::Demultiplex);
        if completed.is_empty() {
            return Err(EngineError::PrerequisiteCardinality {
                kind: TaskKindTag::Demultiplex,
                state: state.name().to_string(),
                found: 0,
            });
        }

        let mut jobs = Vec::with_capacity(completed.len());
        for task in completed {
            let TaskKind::Demultiplex(params) = task.kind() else {
                continue;
            };
            let directory = params
                .bcl_input_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let run = state
                .phase()
                .runs()
                .iter()
                .find(|run| run.directory_name().as_deref() == Some(directory.as_str()))
                .ok_or_else(|| EngineError::RunNotFound {
                    run: directory.clone(),
                    state: state.name().to_string(),
                })?;
            jobs.push(Job {
                params: params.clone(),
                run: run.clone(),
            });
        }
        Ok(jobs)
    }

    async fn evaluate(&self, jobs: &[Job]) -> Verdict {
        let mut uploads = Vec::new();
        for job in jobs {
            let stats_file = job.stats_file();
            if !stats_file.is_file() {
                return Verdict::Suspended(format!(
                    "demultiplex stats file {} does not exist",
                    stats_file.display()
                ));
            }
            let replay = match self.metrics.replay_info(&job.replay_file()).await {
                Ok(replay) => replay,
                Err(err) => return Verdict::Suspended(err.to_string()),
            };
            let stats = match self.metrics.demultiplex_stats(&stats_file).await {
                Ok(stats) => stats,
                Err(err) => return Verdict::Suspended(err.to_string()),
            };

            let (samples, lanes) = match build_records(&job.run, &job.analysis_name(), &replay, &stats) {
                Ok(records) => records,
                Err(errors) => return Verdict::Failed(errors.join("; ")),
            };

            let sample_file = job.params.output_dir.join(SAMPLE_RECORDS);
            let lane_file = job.params.output_dir.join(LANE_RECORDS);
            if let Err(err) = write_records(&sample_file, &samples)
                .and_then(|()| write_records(&lane_file, &lanes))
            {
                return Verdict::Suspended(err.to_string());
            }
            info!(run = %job.run.run_name, samples = samples.len(), lanes = lanes.len(), "demultiplex records written");
            uploads.push(RecordUpload::new(sample_file, SAMPLE_CONTROL));
            uploads.push(RecordUpload::new(lane_file, LANE_CONTROL));
        }
        self.uploader.upload_all(&uploads).await.into_verdict()
    }
}

/// Flattens demultiplex stats into loader rows, checking every sample and
/// lane against the run's contents.
pub fn build_records(
    run: &SequencingRun,
    analysis_name: &str,
    replay: &ReplayInfo,
    stats: &[DemultiplexStat],
) -> Result<(Vec<DemultiplexSampleRecord>, Vec<DemultiplexLaneRecord>), Vec<String>> {
    let mut errors = Vec::new();
    let mut samples = Vec::new();
    // lane -> (assigned, undetermined)
    let mut lanes: BTreeMap<u8, (u64, u64)> = BTreeMap::new();

    for stat in stats {
        if !run.has_lane(stat.lane) {
            errors.push(format!("Unexpected lane {} in run {}", stat.lane, run.run_name));
            continue;
        }
        let counts = lanes.entry(stat.lane).or_default();
        if stat.is_undetermined() {
            counts.1 += stat.reads;
            continue;
        }
        counts.0 += stat.reads;

        let Some(sample_key) = sample_key(&stat.sample_id) else {
            errors.push(format!("Failed to parse sample ID {:?}", stat.sample_id));
            continue;
        };
        if !run.has_sample(&sample_key) {
            errors.push(format!("Unexpected sample {sample_key} in run {}", run.run_name));
            continue;
        }
        if !run.sample_on_lane(&sample_key, stat.lane) {
            errors.push(format!(
                "Unexpected lane {} for sample {sample_key} in run {}",
                stat.lane, run.run_name
            ));
            continue;
        }

        samples.push(DemultiplexSampleRecord {
            run_name: run.run_name.clone(),
            run_date: run.run_date,
            flowcell: run.flowcell_label.clone(),
            analysis_name: analysis_name.to_string(),
            dragen_version: replay.dragen_version.clone(),
            analysis_node: replay.node_name.clone(),
            lane: stat.lane,
            sample_key,
            reads: stat.reads,
            perfect_index_reads: stat.perfect_index_reads,
            one_mismatch_index_reads: stat.one_mismatch_index_reads,
            q30_bases: stat.q30_bases,
            mean_quality_score: stat.mean_quality_score,
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let lanes = lanes
        .into_iter()
        .map(|(lane, (assigned, undetermined))| DemultiplexLaneRecord {
            run_name: run.run_name.clone(),
            run_date: run.run_date,
            flowcell: run.flowcell_label.clone(),
            analysis_name: analysis_name.to_string(),
            dragen_version: replay.dragen_version.clone(),
            analysis_node: replay.node_name.clone(),
            lane,
            orphan_rate: orphan_rate(assigned, undetermined),
        })
        .collect();
    Ok((samples, lanes))
}

fn sample_key(sample_id: &str) -> Option<String> {
    if let Some(read_group) = parse_read_group(sample_id) {
        return Some(read_group.sample);
    }
    if sample_id.is_empty() || sample_id.contains('_') {
        None
    } else {
        Some(sample_id.to_string())
    }
}

fn orphan_rate(assigned: u64, undetermined: u64) -> Option<f64> {
    let total = assigned + undetermined;
    if total == 0 {
        return None;
    }
    Some(undetermined as f64 / total as f64 * 100.0)
}

#[async_trait]
impl TaskHandler for DemultiplexMetricsHandler {
    fn kinds(&self) -> &'static [TaskKindTag] {
        KINDS
    }

    async fn handle(
        &self,
        state: &mut State,
        task_id: TaskId,
        _ctx: &dyn SchedulerContext,
    ) -> Result<(), EngineError> {
        if expect_kind(state, task_id, TaskKindTag::DemultiplexMetrics)?.is_terminal() {
            return Ok(());
        }
        expect_phase(state, TaskKindTag::DemultiplexMetrics, PhaseKind::Demultiplex)?;
        let jobs = Self::jobs(state)?;

        let verdict = self.evaluate(&jobs).await;
        if let Verdict::Failed(message) | Verdict::Suspended(message) = &verdict {
            warn!(state = %state.name(), task = %task_id, reason = %message, "demultiplex metrics not uploaded");
        }
        apply_verdict(task_mut(state, task_id)?, verdict, self.clock.now())
    }
}
