//! Exclusive lock file: at most one coordinator drives a pipeline at a time.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("coordinator lock {0} is held by another process")]
    Held(PathBuf),

    #[error("failed to create coordinator lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Removed when dropped.
///
/// A lock left behind by a crashed coordinator is reclaimed when the pid it
/// records no longer exists under `/proc`. Without `/proc` the lock file must
/// be removed by an operator.
#[derive(Debug)]
pub struct CoordinatorLock {
    path: PathBuf,
}

impl CoordinatorLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        match Self::create(&path) {
            Err(LockError::Held(_)) if holder_is_gone(&path) => {
                warn!(path = %path.display(), "reclaiming stale coordinator lock");
                fs::remove_file(&path).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(LockError::Held(path.to_path_buf()));
            }
            Err(err) => return Err(io_err(err)),
        };
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        info!(path = %path.display(), "coordinator lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// True only when the recorded pid is readable and provably dead.
fn holder_is_gone(path: &Path) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return false;
    }
    match fs::read_to_string(path).map(|raw| raw.trim().parse::<u32>()) {
        Ok(Ok(pid)) => !proc_root.join(pid.to_string()).exists(),
        _ => false,
    }
}

impl Drop for CoordinatorLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to release coordinator lock");
        }
    }
}
