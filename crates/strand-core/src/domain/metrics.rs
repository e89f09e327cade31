//! Decoded tool metrics, as handed over by a `MetricsSource`.

use serde::{Deserialize, Serialize};

/// Sample id the demultiplexer uses for reads matching no barcode.
pub const UNDETERMINED: &str = "Undetermined";

/// One row of the demultiplexer's per-lane, per-sample statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemultiplexStat {
    pub lane: u8,
    /// Read-group style id (`<flowcell>_<lane>_<sample>`) or `Undetermined`.
    pub sample_id: String,
    pub index: String,
    pub reads: u64,
    pub perfect_index_reads: u64,
    pub one_mismatch_index_reads: u64,
    pub q30_bases: u64,
    /// Absent when the tool reported `NaN`.
    pub mean_quality_score: Option<f64>,
}

impl DemultiplexStat {
    pub fn is_undetermined(&self) -> bool {
        self.sample_id.contains(UNDETERMINED)
    }
}

/// Execution facts from a tool's replay manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayInfo {
    pub dragen_version: String,
    pub node_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSummary {
    pub total_reads: u64,
    pub mapped_reads: u64,
    pub duplicate_reads: u64,
    pub mean_coverage: f64,
    /// `None` when contamination was not estimated.
    pub estimated_contamination: Option<f64>,
    pub predicted_sex_ploidy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadGroupMapping {
    pub read_group: String,
    pub total_reads: u64,
    pub mapped_reads: u64,
    pub duplicate_reads: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantCallingSummary {
    pub prefilter: bool,
    pub snps: u64,
    pub indels: u64,
    pub ti_tv_ratio: Option<f64>,
    pub het_hom_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetrics {
    pub summary: MappingSummary,
    pub read_groups: Vec<ReadGroupMapping>,
    pub variant_calling: Vec<VariantCallingSummary>,
}

/// Summary of a fingerprint check against the expected sample's genotypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintSummary {
    pub sample_alias: String,
    pub snps_compared: u32,
    /// `None` when the comparison produced no score.
    pub lod_expected_sample: Option<f64>,
}
