//! In-memory metrics source and QC store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::metrics::{AlignmentMetrics, DemultiplexStat, FingerprintSummary, ReplayInfo};
use crate::ports::{MetricsSource, MetricsSourceError, QcStore, QcStoreError};

/// Metrics keyed by the file they would have been decoded from.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetricsSource {
    demultiplex: HashMap<PathBuf, Vec<DemultiplexStat>>,
    replays: HashMap<PathBuf, ReplayInfo>,
    alignments: HashMap<(PathBuf, String), AlignmentMetrics>,
    fingerprints: HashMap<PathBuf, Option<FingerprintSummary>>,
    undecodable: HashSet<PathBuf>,
}

impl InMemoryMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demultiplex_stats(mut self, stats_file: impl Into<PathBuf>, stats: Vec<DemultiplexStat>) -> Self {
        self.demultiplex.insert(stats_file.into(), stats);
        self
    }

    pub fn with_replay(mut self, replay_file: impl Into<PathBuf>, replay: ReplayInfo) -> Self {
        self.replays.insert(replay_file.into(), replay);
        self
    }

    pub fn with_alignment(
        mut self,
        output_dir: impl Into<PathBuf>,
        output_prefix: impl Into<String>,
        metrics: AlignmentMetrics,
    ) -> Self {
        self.alignments
            .insert((output_dir.into(), output_prefix.into()), metrics);
        self
    }

    pub fn with_fingerprint(mut self, summary_file: impl Into<PathBuf>, summary: Option<FingerprintSummary>) -> Self {
        self.fingerprints.insert(summary_file.into(), summary);
        self
    }

    /// Decoding `path` fails regardless of what else is registered.
    pub fn with_undecodable(mut self, path: impl Into<PathBuf>) -> Self {
        self.undecodable.insert(path.into());
        self
    }

    fn check(&self, path: &Path) -> Result<(), MetricsSourceError> {
        if self.undecodable.contains(path) {
            return Err(MetricsSourceError::Decode {
                path: path.to_path_buf(),
                reason: "unparseable row".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsSource for InMemoryMetricsSource {
    async fn demultiplex_stats(&self, stats_file: &Path) -> Result<Vec<DemultiplexStat>, MetricsSourceError> {
        self.check(stats_file)?;
        self.demultiplex
            .get(stats_file)
            .cloned()
            .ok_or_else(|| MetricsSourceError::Missing(stats_file.to_path_buf()))
    }

    async fn replay_info(&self, replay_file: &Path) -> Result<ReplayInfo, MetricsSourceError> {
        self.check(replay_file)?;
        self.replays
            .get(replay_file)
            .cloned()
            .ok_or_else(|| MetricsSourceError::Missing(replay_file.to_path_buf()))
    }

    async fn alignment_metrics(
        &self,
        output_dir: &Path,
        output_prefix: &str,
    ) -> Result<AlignmentMetrics, MetricsSourceError> {
        self.check(output_dir)?;
        self.alignments
            .get(&(output_dir.to_path_buf(), output_prefix.to_string()))
            .cloned()
            .ok_or_else(|| MetricsSourceError::Missing(output_dir.join(output_prefix)))
    }

    async fn fingerprint_summary(
        &self,
        summary_file: &Path,
    ) -> Result<Option<FingerprintSummary>, MetricsSourceError> {
        self.check(summary_file)?;
        self.fingerprints
            .get(summary_file)
            .cloned()
            .ok_or_else(|| MetricsSourceError::Missing(summary_file.to_path_buf()))
    }
}

/// QC rows that can be published while a test is running.
#[derive(Debug, Default)]
pub struct InMemoryQcStore {
    labels: Mutex<HashSet<String>>,
    outage: Mutex<Option<String>>,
}

impl InMemoryQcStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, vessel_label: impl Into<String>) {
        self.labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vessel_label.into());
    }

    pub fn set_outage(&self, reason: Option<String>) {
        *self.outage.lock().unwrap_or_else(PoisonError::into_inner) = reason;
    }
}

#[async_trait]
impl QcStore for InMemoryQcStore {
    async fn has_metrics(&self, vessel_label: &str) -> Result<bool, QcStoreError> {
        if let Some(reason) = self
            .outage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(QcStoreError::Unavailable(reason));
        }
        Ok(self
            .labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(vessel_label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_and_undecodable_are_distinct() {
        let source = InMemoryMetricsSource::new()
            .with_demultiplex_stats("/a/Demultiplex_Stats.csv", Vec::new())
            .with_undecodable("/b/Demultiplex_Stats.csv");

        assert!(source
            .demultiplex_stats(Path::new("/a/Demultiplex_Stats.csv"))
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            source.demultiplex_stats(Path::new("/b/Demultiplex_Stats.csv")).await,
            Err(MetricsSourceError::Decode { .. })
        ));
        assert!(matches!(
            source.replay_info(Path::new("/a/replay.json")).await,
            Err(MetricsSourceError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn qc_rows_appear_after_publish() {
        let store = InMemoryQcStore::new();
        assert!(!store.has_metrics("CHIP1_R01C01").await.unwrap());
        store.publish("CHIP1_R01C01");
        assert!(store.has_metrics("CHIP1_R01C01").await.unwrap());

        store.set_outage(Some("connection refused".to_string()));
        assert!(store.has_metrics("CHIP1_R01C01").await.is_err());
    }
}
