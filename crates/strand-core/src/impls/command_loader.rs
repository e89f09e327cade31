//! Bulk loader that runs the loader program as a child process.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::ports::{BulkLoader, LoaderError, ProcessOutput};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLoader;

#[async_trait]
impl BulkLoader for CommandLoader {
    async fn run_sync_process(&self, tokens: &[String]) -> Result<ProcessOutput, LoaderError> {
        let (program, args) = tokens.split_first().ok_or(LoaderError::EmptyCommand)?;
        debug!(%program, args = ?args, "running loader");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| LoaderError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut captured_output = String::from_utf8_lossy(&output.stdout).into_owned();
        captured_output.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            captured_output,
        })
    }
}
