//! Launcher that runs commands through a local shell and reaps exit codes.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::domain::{CommandLine, ProcessStatus, Task, TaskResult};
use crate::ports::{LaunchError, ProcessLauncher};

pub struct LocalProcessLauncher {
    shell: String,
    /// Unreaped children. A reaped exit is reported once, then forgotten.
    children: Mutex<HashMap<String, Child>>,
}

impl LocalProcessLauncher {
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            children: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for LocalProcessLauncher {
    async fn fire(&self, command: &CommandLine, task: &Task) -> Result<TaskResult, LaunchError> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command.render())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.shell.clone(),
                source,
            })?;

        let external_id = child
            .id()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| format!("local-{}", Ulid::new()));
        debug!(task = %task.id(), pid = %external_id, "spawned");

        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(external_id.clone(), child);
        Ok(TaskResult::new(external_id, "Started", 0))
    }

    async fn status(&self, external_id: &str) -> ProcessStatus {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(child) = children.get_mut(external_id) else {
            return ProcessStatus::Unknown;
        };
        match child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(status)) => {
                // killed by a signal: no exit code
                let code = status.code().unwrap_or(-1);
                children.remove(external_id);
                ProcessStatus::Exited { code }
            }
            Err(err) => {
                warn!(pid = %external_id, error = %err, "failed to query process");
                ProcessStatus::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::kind::{ComputeArg, ComputeParams};
    use crate::domain::{ResourceRequest, TaskId, TaskKind};
    use std::time::Duration;

    fn compute(program: &str, args: &[(&str, Option<&str>)]) -> Task {
        Task::new(
            TaskId::generate(),
            "compute",
            TaskKind::Compute(ComputeParams {
                program: program.to_string(),
                args: args
                    .iter()
                    .map(|(flag, value)| ComputeArg {
                        flag: flag.to_string(),
                        value: value.map(str::to_string),
                    })
                    .collect(),
                output_dir: None,
                resources: ResourceRequest::default(),
            }),
        )
    }

    async fn wait_for_exit(launcher: &LocalProcessLauncher, id: &str) -> ProcessStatus {
        for _ in 0..200 {
            match launcher.status(id).await {
                ProcessStatus::Running => tokio::time::sleep(Duration::from_millis(10)).await,
                other => return other,
            }
        }
        ProcessStatus::Running
    }

    #[tokio::test]
    async fn reports_exit_codes() {
        let launcher = LocalProcessLauncher::new();

        let ok = compute("true", &[]);
        let result = launcher
            .fire(&ok.kind().command().unwrap().unwrap(), &ok)
            .await
            .unwrap();
        assert_eq!(
            wait_for_exit(&launcher, &result.external_id).await,
            ProcessStatus::Exited { code: 0 }
        );

        let bad = compute("exit", &[("3", None)]);
        let result = launcher
            .fire(&bad.kind().command().unwrap().unwrap(), &bad)
            .await
            .unwrap();
        assert_eq!(
            wait_for_exit(&launcher, &result.external_id).await,
            ProcessStatus::Exited { code: 3 }
        );
        // the caller keeps the code; the launcher does not
        assert_eq!(launcher.status(&result.external_id).await, ProcessStatus::Unknown);
        assert!(launcher.children.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_handles_are_reported() {
        let launcher = LocalProcessLauncher::new();
        assert_eq!(launcher.status("999999").await, ProcessStatus::Unknown);
    }
}
