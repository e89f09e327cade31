//! Application layer: wires ports, handlers and the domain together.
//!
//! - **EngineBuilder**: fail-fast wiring of collaborators and handlers
//! - **TaskManager**: fire / probe / poll / handle for single tasks
//! - **StateManager**: state entry hooks and readiness
//! - **Coordinator**: one cooperative pass over a state
//! - **CoordinatorLock**: single-writer lock file

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod hooks;
pub mod lock;
pub mod state_manager;
pub mod task_manager;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::config::{ConfigError, EngineConfig, LoaderConfig, UploadConfig};
pub use self::coordinator::{Coordinator, CoordinatorError, StepReport};
pub use self::hooks::{HookError, StateHook};
pub use self::lock::{CoordinatorLock, LockError};
pub use self::state_manager::StateManager;
pub use self::task_manager::TaskManager;
