//! State entry hooks, one per phase.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Phase, PhaseKind, State, Task, TaskKind, TaskKindTag};
use crate::error::EngineError;
use crate::ports::IdGenerator;

/// Name of the metrics exit task seeded by the alignment hooks.
pub const ALIGNMENT_METRICS_TASK: &str = "alignment-metrics";

const FASTQ_LIST: &str = "fastq_list.csv";
const SAMPLE_COLUMN: &str = "RGSM";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("fastq list error: {0}")]
    Csv(#[from] csv::Error),
}

fn create_dir(path: &Path) -> Result<(), HookError> {
    fs::create_dir_all(path).map_err(|source| HookError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn require(path: &Path, what: &str) -> Result<(), HookError> {
    if path.exists() {
        Ok(())
    } else {
        Err(HookError::Precondition(format!("{what} {} does not exist", path.display())))
    }
}

pub trait StateHook: Send + Sync {
    fn phase(&self) -> PhaseKind;

    /// Prepares `state` for its first poll. Must be safe to run again after a failure.
    fn on_enter(&self, state: &mut State) -> Result<(), HookError>;
}

pub struct DemultiplexHook;

impl StateHook for DemultiplexHook {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Demultiplex
    }

    fn on_enter(&self, state: &mut State) -> Result<(), HookError> {
        for task in state.tasks_of_kind(TaskKindTag::Demultiplex) {
            if let TaskKind::Demultiplex(params) = task.kind() {
                require(&params.bcl_input_dir, "bcl input directory")?;
                create_dir(&params.output_dir.join("Reports"))?;
            }
        }
        Ok(())
    }
}

/// Creates output folders and seeds the metrics exit task.
pub struct AlignmentHook {
    ids: Arc<dyn IdGenerator>,
}

impl AlignmentHook {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }
}

impl StateHook for AlignmentHook {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Alignment
    }

    fn on_enter(&self, state: &mut State) -> Result<(), HookError> {
        for task in state.tasks_of_kind(TaskKindTag::Alignment) {
            if let TaskKind::Alignment(params) = task.kind() {
                create_dir(&params.output_dir)?;
            }
        }
        seed_metrics_task(state, self.ids.as_ref())
    }
}

/// Like `AlignmentHook`, plus the aggregation's fastq list is rebuilt from
/// the demultiplex fastq lists, keeping only the sample's rows.
pub struct AggregationHook {
    ids: Arc<dyn IdGenerator>,
}

impl AggregationHook {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }
}

impl StateHook for AggregationHook {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Aggregation
    }

    fn on_enter(&self, state: &mut State) -> Result<(), HookError> {
        let Phase::Aggregation {
            sample,
            runs,
            fastq_sources,
        } = state.phase()
        else {
            return Ok(());
        };
        let sources: Vec<PathBuf> = if fastq_sources.is_empty() {
            runs.iter()
                .filter_map(|run| run.demultiplex_dir.as_ref())
                .map(|dir| dir.join("Reports").join(FASTQ_LIST))
                .collect()
        } else {
            fastq_sources.clone()
        };

        for task in state.tasks_of_kind(TaskKindTag::Aggregation) {
            if let TaskKind::Aggregation(params) = task.kind() {
                create_dir(&params.output_dir)?;
                let rows = merge_fastq_lists(&sources, &sample.sample_key, &params.fastq_list)?;
                info!(
                    sample = %sample.sample_key,
                    rows,
                    fastq_list = %params.fastq_list.display(),
                    "fastq list aggregated"
                );
            }
        }
        seed_metrics_task(state, self.ids.as_ref())
    }
}

fn seed_metrics_task(state: &mut State, ids: &dyn IdGenerator) -> Result<(), HookError> {
    if state.exit_task().is_some() {
        return Ok(());
    }
    state.set_exit_task(Task::new(
        ids.generate_task_id(),
        ALIGNMENT_METRICS_TASK,
        TaskKind::AlignmentMetrics,
    ))?;
    debug!(state = %state.name(), "alignment metrics exit task added");
    Ok(())
}

/// Concatenates fastq lists into `destination`, keeping rows whose `RGSM`
/// is `sample_key`. Every source must share the first source's header.
pub fn merge_fastq_lists(sources: &[PathBuf], sample_key: &str, destination: &Path) -> Result<usize, HookError> {
    let Some(first) = sources.first() else {
        return Err(HookError::Precondition(format!(
            "no fastq lists to aggregate for {sample_key}"
        )));
    };
    for source in sources {
        require(source, "fastq list")?;
    }

    let header = csv::Reader::from_path(first)?.headers()?.clone();
    let sample_column = header
        .iter()
        .position(|column| column == SAMPLE_COLUMN)
        .ok_or_else(|| {
            HookError::Precondition(format!("{} has no {SAMPLE_COLUMN} column", first.display()))
        })?;

    let mut writer = csv::Writer::from_path(destination)?;
    writer.write_record(&header)?;
    let mut rows = 0;
    for source in sources {
        let mut reader = csv::Reader::from_path(source)?;
        if reader.headers()? != &header {
            return Err(HookError::Precondition(format!(
                "{} does not match the header of {}",
                source.display(),
                first.display()
            )));
        }
        for record in reader.records() {
            let record = record?;
            if record.get(sample_column) == Some(sample_key) {
                writer.write_record(&record)?;
                rows += 1;
            }
        }
    }
    writer.flush().map_err(|source| HookError::Io {
        path: destination.to_path_buf(),
        source,
    })?;
    Ok(rows)
}

pub struct FingerprintHook;

impl StateHook for FingerprintHook {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Fingerprint
    }

    fn on_enter(&self, state: &mut State) -> Result<(), HookError> {
        for task in state.tasks_of_kind(TaskKindTag::Fingerprint) {
            if let TaskKind::Fingerprint(params) = task.kind() {
                require(&params.bam_file, "input bam")?;
                if let Some(dir) = params.output_dir() {
                    create_dir(dir)?;
                }
            }
        }
        Ok(())
    }
}
