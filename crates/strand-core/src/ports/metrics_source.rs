//! MetricsSource port: decoded tool metrics keyed by the file they came from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::metrics::{AlignmentMetrics, DemultiplexStat, FingerprintSummary, ReplayInfo};

#[derive(Debug, Error)]
pub enum MetricsSourceError {
    #[error("no metrics available for {0}")]
    Missing(PathBuf),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn demultiplex_stats(&self, stats_file: &Path) -> Result<Vec<DemultiplexStat>, MetricsSourceError>;

    async fn replay_info(&self, replay_file: &Path) -> Result<ReplayInfo, MetricsSourceError>;

    async fn alignment_metrics(
        &self,
        output_dir: &Path,
        output_prefix: &str,
    ) -> Result<AlignmentMetrics, MetricsSourceError>;

    /// `Ok(None)` when no reference fingerprint existed to compare against.
    async fn fingerprint_summary(
        &self,
        summary_file: &Path,
    ) -> Result<Option<FingerprintSummary>, MetricsSourceError>;
}
