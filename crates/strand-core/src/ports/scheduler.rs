//! SchedulerContext port: provenance lookups for running jobs.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub node_name: String,
}

#[async_trait]
pub trait SchedulerContext: Send + Sync {
    /// Best effort. `None` leaves the provenance field blank.
    async fn resolve_host(&self, external_id: &str) -> Option<HostInfo>;
}
