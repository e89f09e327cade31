//! QcStore port: external QC rows keyed by vessel label.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QcStoreError {
    #[error("qc store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait QcStore: Send + Sync {
    async fn has_metrics(&self, vessel_label: &str) -> Result<bool, QcStoreError>;
}
