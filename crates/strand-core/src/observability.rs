//! Logging setup and status views.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::domain::TaskStatus;

/// Installs a fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(env_filter)
        .try_init()
        .is_ok()
}

/// Task counts per status for one state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
    pub suspended: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Queued => self.queued += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Complete => self.complete += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Suspended => self.suspended += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.complete + self.failed + self.suspended
    }
}
