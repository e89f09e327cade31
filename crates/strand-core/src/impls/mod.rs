//! Implementations of the ports: a tool simulator, a local process launcher,
//! a command-based loader and in-memory/file-backed stores.

pub mod command_loader;
pub mod dragen_simulator;
pub mod json_store;
pub mod local_launcher;
pub mod memory;
pub mod static_scheduler;

pub use self::command_loader::CommandLoader;
pub use self::dragen_simulator::DragenSimulator;
pub use self::json_store::JsonFileStateStore;
pub use self::local_launcher::LocalProcessLauncher;
pub use self::memory::{InMemoryMetricsSource, InMemoryQcStore};
pub use self::static_scheduler::StaticSchedulerContext;
