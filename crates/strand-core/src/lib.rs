//! strand-core
//!
//! Task and state orchestration for sequencing and arrays pipelines.
//!
//! # Modules
//! - **domain**: tasks, states, task kinds and their parameters, metric records
//! - **ports**: collaborator traits (ProcessLauncher, SchedulerContext, BulkLoader, MetricsSource, StateStore, ...)
//! - **handlers**: per-kind task handlers behind a HandlerRegistry
//! - **app**: config, TaskManager, StateManager, Coordinator and its builder
//! - **impls**: simulator, local launcher, loaders and stores

pub mod app;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod impls;
pub mod observability;
pub mod ports;

pub use self::error::EngineError;
