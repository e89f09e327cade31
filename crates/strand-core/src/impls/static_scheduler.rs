//! Scheduler context backed by a fixed job-to-host table.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::ports::{HostInfo, SchedulerContext};

#[derive(Debug, Clone, Default)]
pub struct StaticSchedulerContext {
    hosts: HashMap<String, String>,
    default_node: Option<String>,
}

impl StaticSchedulerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job resolves to `node_name` unless mapped explicitly.
    pub fn single_node(node_name: impl Into<String>) -> Self {
        Self {
            hosts: HashMap::new(),
            default_node: Some(node_name.into()),
        }
    }

    pub fn with_host(mut self, external_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        self.hosts.insert(external_id.into(), node_name.into());
        self
    }
}

#[async_trait]
impl SchedulerContext for StaticSchedulerContext {
    async fn resolve_host(&self, external_id: &str) -> Option<HostInfo> {
        self.hosts
            .get(external_id)
            .or(self.default_node.as_ref())
            .map(|node_name| HostInfo {
                node_name: node_name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_mapping_beats_default() {
        let ctx = StaticSchedulerContext::single_node("dragen01").with_host("42", "dragen07");
        assert_eq!(ctx.resolve_host("42").await.unwrap().node_name, "dragen07");
        assert_eq!(ctx.resolve_host("7").await.unwrap().node_name, "dragen01");
        assert_eq!(StaticSchedulerContext::new().resolve_host("7").await, None);
    }
}
