//! Task kinds and their structured parameters.
//!
//! Each process kind stores its tool parameters as typed fields. The command
//! line is rendered from them on demand and never parsed back, so derived
//! values such as the output directory always come from the fields.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::command::{CommandBuilder, CommandError, CommandLine};

pub const DRAGEN: &str = "dragen";
pub const PICARD: &str = "picard";

/// Resource declaration surfaced to the launcher. The engine never enforces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    #[serde(default)]
    pub cpus_per_task: Option<u32>,

    /// Mutually exclusive with other exclusive tasks on the same partition.
    #[serde(default)]
    pub exclusive: bool,

    #[serde(default)]
    pub partition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemultiplexParams {
    pub bcl_input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sample_sheet: PathBuf,
    #[serde(default)]
    pub resources: ResourceRequest,
}

impl DemultiplexParams {
    fn command(&self) -> Result<CommandLine, CommandError> {
        CommandBuilder::new(DRAGEN)
            .arg("--bcl-conversion-only", true)
            .path("--bcl-input-directory", &self.bcl_input_dir)
            .path("--output-directory", &self.output_dir)
            .path("--sample-sheet", &self.sample_sheet)
            .arg("--bcl-only-matched-reads", true)
            .arg("--strict-mode", true)
            .flag("--force")
            .build()
    }
}

/// Parameters shared by per-run alignment and cross-run aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentParams {
    pub reference_dir: PathBuf,
    pub fastq_list: PathBuf,
    pub fastq_list_sample_id: String,
    pub output_dir: PathBuf,
    pub intermediate_results_dir: PathBuf,
    pub output_file_prefix: String,
    pub vc_sample_name: String,
    #[serde(default)]
    pub qc_contamination_vcf: Option<PathBuf>,
    #[serde(default)]
    pub qc_coverage_bed: Option<PathBuf>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub resources: ResourceRequest,
}

impl AlignmentParams {
    fn command(&self) -> Result<CommandLine, CommandError> {
        CommandBuilder::new(DRAGEN)
            .path("-r", &self.reference_dir)
            .path("--fastq-list", &self.fastq_list)
            .arg("--fastq-list-sample-id", &self.fastq_list_sample_id)
            .path("--output-directory", &self.output_dir)
            .path("--intermediate-results-dir", &self.intermediate_results_dir)
            .arg("--output-file-prefix", &self.output_file_prefix)
            .arg("--vc-sample-name", &self.vc_sample_name)
            .arg("--enable-map-align", true)
            .arg("--enable-map-align-output", true)
            .arg("--enable-duplicate-marking", true)
            .arg("--enable-variant-caller", true)
            .opt_path("--qc-cross-cont-vcf", self.qc_contamination_vcf.as_deref())
            .opt_path("--qc-coverage-region-1", self.qc_coverage_bed.as_deref())
            .opt_arg("--sample-sex", self.sex.as_deref())
            .build()
    }

    pub fn replay_file(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}-replay.json", self.output_file_prefix))
    }

    pub fn mapping_metrics_file(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.mapping_metrics.csv", self.output_file_prefix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintParams {
    pub bam_file: PathBuf,
    /// Path prefix of the summary/detail metric files.
    pub output_prefix: PathBuf,
    pub haplotype_map: PathBuf,
    pub genotypes: PathBuf,
    pub sample_alias: String,
    #[serde(default)]
    pub resources: ResourceRequest,
}

impl FingerprintParams {
    fn command(&self) -> Result<CommandLine, CommandError> {
        CommandBuilder::new(PICARD)
            .operand("CheckFingerprint")
            .path("--INPUT", &self.bam_file)
            .path("--OUTPUT", &self.output_prefix)
            .path("--HAPLOTYPE_MAP", &self.haplotype_map)
            .path("--GENOTYPES", &self.genotypes)
            .arg("--EXPECTED_SAMPLE_ALIAS", &self.sample_alias)
            .build()
    }

    pub fn summary_file(&self) -> PathBuf {
        suffixed(&self.output_prefix, ".fingerprinting_summary_metrics")
    }

    pub fn detail_file(&self) -> PathBuf {
        suffixed(&self.output_prefix, ".fingerprinting_detail_metrics")
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_prefix.parent()
    }

    /// Analysis folder the bam sits under: `<analysis>/<sample>/<version>/x.bam`.
    pub fn analysis_name(&self) -> Option<String> {
        self.bam_file
            .ancestors()
            .nth(3)
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushIdatsParams {
    pub sources: Vec<PathBuf>,
    pub destination: String,
    pub thread_count: u32,
    pub process_count: u32,
    #[serde(default = "default_gsutil")]
    pub gsutil: String,
}

fn default_gsutil() -> String {
    "gsutil".to_string()
}

impl PushIdatsParams {
    fn command(&self) -> Result<CommandLine, CommandError> {
        let mut builder = CommandBuilder::new(self.gsutil.as_str())
            .arg("-o", format!("GSUtil:parallel_thread_count={}", self.thread_count))
            .arg("-o", format!("GSUtil:parallel_process_count={}", self.process_count))
            .flag("-m")
            .operand("cp");
        for source in &self.sources {
            builder = builder.operand(source.display());
        }
        builder.operand(&self.destination).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeArg {
    pub flag: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Generic command with a resource request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeParams {
    pub program: String,
    #[serde(default)]
    pub args: Vec<ComputeArg>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub resources: ResourceRequest,
}

impl ComputeParams {
    fn command(&self) -> Result<CommandLine, CommandError> {
        self.args
            .iter()
            .fold(CommandBuilder::new(self.program.as_str()), |builder, arg| {
                match &arg.value {
                    Some(value) => builder.arg(&arg.flag, value),
                    None => builder.flag(&arg.flag),
                }
            })
            .build()
    }
}

/// What a task does. Immutable once the task is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TaskKind {
    Demultiplex(DemultiplexParams),
    Alignment(AlignmentParams),
    Aggregation(AlignmentParams),
    Fingerprint(FingerprintParams),
    PushIdatsToCloud(PushIdatsParams),
    Compute(ComputeParams),

    WaitForFile { path: PathBuf },
    WaitForIdat { chip_barcode: String, position: String },
    WaitForInfiniumMetrics { vessel_label: String },
    DeleteFolder { path: PathBuf },

    DemultiplexMetrics,
    AlignmentMetrics,
    FingerprintUpload,

    WaitForReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKindTag {
    Demultiplex,
    Alignment,
    Aggregation,
    Fingerprint,
    PushIdatsToCloud,
    Compute,
    WaitForFile,
    WaitForIdat,
    WaitForInfiniumMetrics,
    DeleteFolder,
    DemultiplexMetrics,
    AlignmentMetrics,
    FingerprintUpload,
    WaitForReview,
}

impl TaskKindTag {
    pub const ALL: [TaskKindTag; 14] = [
        TaskKindTag::Demultiplex,
        TaskKindTag::Alignment,
        TaskKindTag::Aggregation,
        TaskKindTag::Fingerprint,
        TaskKindTag::PushIdatsToCloud,
        TaskKindTag::Compute,
        TaskKindTag::WaitForFile,
        TaskKindTag::WaitForIdat,
        TaskKindTag::WaitForInfiniumMetrics,
        TaskKindTag::DeleteFolder,
        TaskKindTag::DemultiplexMetrics,
        TaskKindTag::AlignmentMetrics,
        TaskKindTag::FingerprintUpload,
        TaskKindTag::WaitForReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKindTag::Demultiplex => "Demultiplex",
            TaskKindTag::Alignment => "Alignment",
            TaskKindTag::Aggregation => "Aggregation",
            TaskKindTag::Fingerprint => "Fingerprint",
            TaskKindTag::PushIdatsToCloud => "PushIdatsToCloud",
            TaskKindTag::Compute => "Compute",
            TaskKindTag::WaitForFile => "WaitForFile",
            TaskKindTag::WaitForIdat => "WaitForIdat",
            TaskKindTag::WaitForInfiniumMetrics => "WaitForInfiniumMetrics",
            TaskKindTag::DeleteFolder => "DeleteFolder",
            TaskKindTag::DemultiplexMetrics => "DemultiplexMetrics",
            TaskKindTag::AlignmentMetrics => "AlignmentMetrics",
            TaskKindTag::FingerprintUpload => "FingerprintUpload",
            TaskKindTag::WaitForReview => "WaitForReview",
        }
    }

    pub fn class(self) -> TaskClass {
        match self {
            TaskKindTag::Demultiplex
            | TaskKindTag::Alignment
            | TaskKindTag::Aggregation
            | TaskKindTag::Fingerprint
            | TaskKindTag::PushIdatsToCloud
            | TaskKindTag::Compute => TaskClass::Process,
            TaskKindTag::WaitForFile
            | TaskKindTag::WaitForIdat
            | TaskKindTag::WaitForInfiniumMetrics
            | TaskKindTag::DeleteFolder => TaskClass::Wait,
            TaskKindTag::DemultiplexMetrics
            | TaskKindTag::AlignmentMetrics
            | TaskKindTag::FingerprintUpload => TaskClass::Inline,
            TaskKindTag::WaitForReview => TaskClass::ManualGate,
        }
    }
}

impl fmt::Display for TaskKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a kind reaches completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    /// Dispatched to the process launcher; finished when the process exits.
    Process,
    /// Nothing to launch; an external condition is polled.
    Wait,
    /// The handler itself performs the work when polled.
    Inline,
    /// Finished only by an explicit human decision.
    ManualGate,
}

impl TaskKind {
    pub fn tag(&self) -> TaskKindTag {
        match self {
            TaskKind::Demultiplex(_) => TaskKindTag::Demultiplex,
            TaskKind::Alignment(_) => TaskKindTag::Alignment,
            TaskKind::Aggregation(_) => TaskKindTag::Aggregation,
            TaskKind::Fingerprint(_) => TaskKindTag::Fingerprint,
            TaskKind::PushIdatsToCloud(_) => TaskKindTag::PushIdatsToCloud,
            TaskKind::Compute(_) => TaskKindTag::Compute,
            TaskKind::WaitForFile { .. } => TaskKindTag::WaitForFile,
            TaskKind::WaitForIdat { .. } => TaskKindTag::WaitForIdat,
            TaskKind::WaitForInfiniumMetrics { .. } => TaskKindTag::WaitForInfiniumMetrics,
            TaskKind::DeleteFolder { .. } => TaskKindTag::DeleteFolder,
            TaskKind::DemultiplexMetrics => TaskKindTag::DemultiplexMetrics,
            TaskKind::AlignmentMetrics => TaskKindTag::AlignmentMetrics,
            TaskKind::FingerprintUpload => TaskKindTag::FingerprintUpload,
            TaskKind::WaitForReview => TaskKindTag::WaitForReview,
        }
    }

    pub fn class(&self) -> TaskClass {
        self.tag().class()
    }

    /// Renders the tool invocation. `Ok(None)` for kinds with nothing to launch.
    pub fn command(&self) -> Result<Option<CommandLine>, CommandError> {
        let command = match self {
            TaskKind::Demultiplex(params) => params.command()?,
            TaskKind::Alignment(params) | TaskKind::Aggregation(params) => params.command()?,
            TaskKind::Fingerprint(params) => params.command()?,
            TaskKind::PushIdatsToCloud(params) => params.command()?,
            TaskKind::Compute(params) => params.command()?,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Directory the tool is expected to leave behind.
    pub fn output_dir(&self) -> Option<&Path> {
        match self {
            TaskKind::Demultiplex(params) => Some(&params.output_dir),
            TaskKind::Alignment(params) | TaskKind::Aggregation(params) => {
                Some(&params.output_dir)
            }
            TaskKind::Fingerprint(params) => params.output_dir(),
            TaskKind::Compute(params) => params.output_dir.as_deref(),
            _ => None,
        }
    }

    pub fn resources(&self) -> Option<&ResourceRequest> {
        match self {
            TaskKind::Demultiplex(params) => Some(&params.resources),
            TaskKind::Alignment(params) | TaskKind::Aggregation(params) => {
                Some(&params.resources)
            }
            TaskKind::Fingerprint(params) => Some(&params.resources),
            TaskKind::Compute(params) => Some(&params.resources),
            _ => None,
        }
    }
}

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn demultiplex(root: &Path) -> TaskKind {
        TaskKind::Demultiplex(DemultiplexParams {
            bcl_input_dir: root.join("bcl"),
            output_dir: root.join("demux"),
            sample_sheet: root.join("SampleSheet.csv"),
            resources: ResourceRequest::default(),
        })
    }

    pub fn alignment_params(root: &Path, prefix: &str) -> AlignmentParams {
        AlignmentParams {
            reference_dir: root.join("ref"),
            fastq_list: root.join("fastq_list.csv"),
            fastq_list_sample_id: "SM-1".to_string(),
            output_dir: root.join("align"),
            intermediate_results_dir: root.join("tmp"),
            output_file_prefix: prefix.to_string(),
            vc_sample_name: "SM-1".to_string(),
            qc_contamination_vcf: None,
            qc_coverage_bed: None,
            sex: None,
            resources: ResourceRequest {
                cpus_per_task: Some(16),
                exclusive: true,
                partition: Some("dragen".to_string()),
            },
        }
    }

    pub fn alignment(root: &Path) -> TaskKind {
        TaskKind::Alignment(alignment_params(root, "SM-1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::parse_flag_value;
    use rstest::rstest;

    #[test]
    fn alignment_command_reads_back_its_params() {
        let params = fixtures::alignment_params(Path::new("/seq/a"), "SM-1");
        let rendered = TaskKind::Alignment(params.clone())
            .command()
            .unwrap()
            .unwrap()
            .render();

        for (flag, expected) in [
            ("--output-directory", "/seq/a/align"),
            ("--fastq-list-sample-id", "SM-1"),
            ("--output-file-prefix", "SM-1"),
        ] {
            assert_eq!(parse_flag_value(flag, &rendered, true).unwrap(), expected);
        }
        assert!(!rendered.contains("--qc-cross-cont-vcf"));
    }

    #[test]
    fn whitespace_in_a_path_fails_rendering() {
        let params = fixtures::alignment_params(Path::new("/seq/my run"), "SM-1");
        let err = TaskKind::Aggregation(params).command().unwrap_err();
        assert!(matches!(err, CommandError::Whitespace { .. }));
    }

    #[test]
    fn push_idats_renders_bounded_parallelism() {
        let kind = TaskKind::PushIdatsToCloud(PushIdatsParams {
            sources: vec![PathBuf::from("/data/a_Red.idat"), PathBuf::from("/data/a_Grn.idat")],
            destination: "gs://arrays/chip1/".to_string(),
            thread_count: 4,
            process_count: 2,
            gsutil: default_gsutil(),
        });
        assert_eq!(
            kind.command().unwrap().unwrap().render(),
            "gsutil -o GSUtil:parallel_thread_count=4 -o GSUtil:parallel_process_count=2 \
             -m cp /data/a_Red.idat /data/a_Grn.idat gs://arrays/chip1/"
        );
    }

    #[test]
    fn fingerprint_paths_derive_from_prefix() {
        let params = FingerprintParams {
            bam_file: PathBuf::from("/seq/analysis1/SM-1/v1/SM-1.bam"),
            output_prefix: PathBuf::from("/seq/fp/SM-1"),
            haplotype_map: PathBuf::from("/ref/hap.txt"),
            genotypes: PathBuf::from("/ref/geno.vcf"),
            sample_alias: "SM-1".to_string(),
            resources: ResourceRequest::default(),
        };
        assert_eq!(
            params.summary_file(),
            PathBuf::from("/seq/fp/SM-1.fingerprinting_summary_metrics")
        );
        assert_eq!(params.output_dir(), Some(Path::new("/seq/fp")));
        assert_eq!(params.analysis_name().as_deref(), Some("analysis1"));
    }

    #[rstest]
    #[case::process(TaskKindTag::Alignment, TaskClass::Process)]
    #[case::wait(TaskKindTag::DeleteFolder, TaskClass::Wait)]
    #[case::inline(TaskKindTag::AlignmentMetrics, TaskClass::Inline)]
    #[case::gate(TaskKindTag::WaitForReview, TaskClass::ManualGate)]
    fn kinds_map_to_classes(#[case] tag: TaskKindTag, #[case] class: TaskClass) {
        assert_eq!(tag.class(), class);
    }

    #[test]
    fn kinds_serialize_with_a_tag() {
        let kind = TaskKind::DeleteFolder {
            path: PathBuf::from("/seq/old"),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "DeleteFolder");
        assert_eq!(json["path"], "/seq/old");

        let back: TaskKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
        assert_eq!(
            serde_json::to_value(TaskKind::WaitForReview).unwrap()["kind"],
            "WaitForReview"
        );
    }

    #[test]
    fn wait_kinds_have_no_command() {
        assert_eq!(TaskKind::WaitForReview.command().unwrap(), None);
        assert_eq!(TaskKind::AlignmentMetrics.output_dir(), None);
    }
}
