//! Flat rows handed to the bulk loader, one `.dat` file per record type.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to write records to {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush records to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemultiplexSampleRecord {
    pub run_name: String,
    pub run_date: NaiveDate,
    pub flowcell: String,
    pub analysis_name: String,
    pub dragen_version: String,
    pub analysis_node: String,
    pub lane: u8,
    pub sample_key: String,
    pub reads: u64,
    pub perfect_index_reads: u64,
    pub one_mismatch_index_reads: u64,
    pub q30_bases: u64,
    pub mean_quality_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemultiplexLaneRecord {
    pub run_name: String,
    pub run_date: NaiveDate,
    pub flowcell: String,
    pub analysis_name: String,
    pub dragen_version: String,
    pub analysis_node: String,
    pub lane: u8,
    /// Percent of the lane's reads left undetermined.
    pub orphan_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentSummaryRecord {
    pub run_name: String,
    pub run_date: Option<NaiveDate>,
    pub sample_alias: String,
    pub analysis_name: String,
    pub analysis_node: String,
    pub dragen_version: String,
    pub total_reads: u64,
    pub mapped_reads: u64,
    pub duplicate_reads: u64,
    pub mean_coverage: f64,
    pub estimated_contamination: Option<f64>,
    pub predicted_sex_ploidy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadGroupRecord {
    pub run_name: String,
    pub run_date: Option<NaiveDate>,
    pub sample_alias: String,
    pub analysis_name: String,
    pub read_group: String,
    pub total_reads: u64,
    pub mapped_reads: u64,
    pub duplicate_reads: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantCallingRecord {
    pub run_name: String,
    pub run_date: Option<NaiveDate>,
    pub sample_alias: String,
    pub analysis_name: String,
    pub prefilter: bool,
    pub snps: u64,
    pub indels: u64,
    pub ti_tv_ratio: Option<f64>,
    pub het_hom_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintScoreRecord {
    pub analysis_name: String,
    pub sample_alias: String,
    pub snps_compared: u32,
    pub lod_score: f64,
    pub scored_at: DateTime<Utc>,
}

/// Writes `rows` as comma-separated lines without a header.
pub fn write_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), RecordError> {
    let csv_err = |source| RecordError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })
}
