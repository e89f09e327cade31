//! Launcher test double that fabricates tool outputs instead of running tools.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::domain::kind::{AlignmentParams, DemultiplexParams, FingerprintParams};
use crate::domain::{CommandLine, ProcessStatus, Task, TaskKind, TaskResult};
use crate::ports::{LaunchError, ProcessLauncher};

pub const SIMULATED_NODE: &str = "dragen01";
pub const SIMULATED_VERSION: &str = "07.021.510.3.5.7";

const DEMULTIPLEX_STATS_HEADER: &str = "Lane,SampleID,Index,# Reads,# Perfect Index Reads,\
# One Mismatch Index Reads,# of >= Q30 Bases (PF),Mean Quality Score (PF)\n";
const FASTQ_LIST_HEADER: &str = "RGID,RGSM,RGLB,Lane,Read1File,Read2File\n";

pub struct DragenSimulator {
    exit_code: i32,
    fired: Mutex<HashMap<String, i32>>,
}

impl DragenSimulator {
    pub fn new() -> Self {
        Self::with_exit_code(0)
    }

    /// Every simulated process reports `exit_code` when it is polled.
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            fired: Mutex::new(HashMap::new()),
        }
    }

    fn demultiplex(params: &DemultiplexParams) -> std::io::Result<()> {
        let reports = params.output_dir.join("Reports");
        fs::create_dir_all(&reports)?;
        fs::write(reports.join("Demultiplex_Stats.csv"), DEMULTIPLEX_STATS_HEADER)?;
        fs::write(reports.join("fastq_list.csv"), FASTQ_LIST_HEADER)?;
        write_replay(&params.output_dir.join("replay.json"))
    }

    fn alignment(params: &AlignmentParams) -> std::io::Result<()> {
        fs::create_dir_all(&params.output_dir)?;
        write_replay(&params.replay_file())?;
        fs::write(
            params.mapping_metrics_file(),
            format!(
                "MAPPING/ALIGNING SUMMARY,,Total input reads,100\n\
                 MAPPING/ALIGNING PER RG,{rg},Total reads in RG,100\n",
                rg = params.fastq_list_sample_id
            ),
        )
    }

    fn fingerprint(params: &FingerprintParams) -> std::io::Result<()> {
        if let Some(dir) = params.output_dir() {
            fs::create_dir_all(dir)?;
        }
        fs::write(params.summary_file(), "READ_GROUP\tSAMPLE\tLOD_EXPECTED_SAMPLE\n")?;
        fs::write(params.detail_file(), "READ_GROUP\tSAMPLE\tSNP\tGENOTYPE\n")
    }
}

impl Default for DragenSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn write_replay(path: &Path) -> std::io::Result<()> {
    let replay = json!({
        "system": {
            "dragen_version": SIMULATED_VERSION,
            "nodename": SIMULATED_NODE,
        }
    });
    fs::write(path, replay.to_string())
}

#[async_trait]
impl ProcessLauncher for DragenSimulator {
    async fn fire(&self, command: &CommandLine, task: &Task) -> Result<TaskResult, LaunchError> {
        info!(task = %task.id(), command = %command, "simulating");
        match task.kind() {
            TaskKind::Demultiplex(params) => Self::demultiplex(params)?,
            TaskKind::Alignment(params) | TaskKind::Aggregation(params) => Self::alignment(params)?,
            TaskKind::Fingerprint(params) => Self::fingerprint(params)?,
            other => {
                if let Some(dir) = other.output_dir() {
                    fs::create_dir_all(dir)?;
                }
            }
        }

        let external_id = rand::random::<u32>().to_string();
        self.fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(external_id.clone(), self.exit_code);
        Ok(TaskResult::new(external_id, "Success", 0))
    }

    async fn status(&self, external_id: &str) -> ProcessStatus {
        match self
            .fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(external_id)
        {
            Some(code) => ProcessStatus::Exited { code: *code },
            None => ProcessStatus::Unknown,
        }
    }
}
