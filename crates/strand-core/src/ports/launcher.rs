//! ProcessLauncher port: starts external tools and reports how they ended.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CommandLine, ProcessStatus, Task, TaskResult};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("launcher rejected the task: {0}")]
    Rejected(String),

    #[error("failed to prepare outputs: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Starts `command` on behalf of `task`. The task's resource request is
    /// available through `task.kind().resources()`.
    async fn fire(&self, command: &CommandLine, task: &Task) -> Result<TaskResult, LaunchError>;

    /// Liveness and exit code of a previously fired process.
    async fn status(&self, external_id: &str) -> ProcessStatus;
}
