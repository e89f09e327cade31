//! Ports: one trait per external collaborator.
//!
//! The engine only talks to launchers, schedulers, loaders, metric sources,
//! QC stores and persistence through these traits, so each can be swapped
//! for a test double.

pub mod clock;
pub mod id_generator;
pub mod launcher;
pub mod loader;
pub mod metrics_source;
pub mod qc_store;
pub mod scheduler;
pub mod state_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::launcher::{LaunchError, ProcessLauncher};
pub use self::loader::{BulkLoader, LoaderError, ProcessOutput};
pub use self::metrics_source::{MetricsSource, MetricsSourceError};
pub use self::qc_store::{QcStore, QcStoreError};
pub use self::scheduler::{HostInfo, SchedulerContext};
pub use self::state_store::{StateStore, StoreError};
