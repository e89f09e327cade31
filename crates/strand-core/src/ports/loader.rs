//! BulkLoader port: synchronous warehouse loads.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub captured_output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("empty loader command")]
    EmptyCommand,

    #[error("failed to run loader {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Runs `tokens[0]` with the remaining tokens as arguments and waits for it.
    async fn run_sync_process(&self, tokens: &[String]) -> Result<ProcessOutput, LoaderError>;
}
