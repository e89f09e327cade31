//! EngineBuilder: wires collaborators and handlers into a `Coordinator`.
//!
//! Startup is fail-fast: kinds passed to `expect_kinds` must all have a
//! handler once the defaults are registered, otherwise `build` returns
//! `BuildError::MissingHandlers`.

use std::sync::Arc;

use crate::domain::TaskKindTag;
use crate::handlers::{
    AlignmentMetricsHandler, DeleteFolderHandler, DemultiplexMetricsHandler, FingerprintUploadHandler,
    HandlerRegistry, MetricsUploader, ProcessTaskHandler, RegistryError, ReviewGate, TaskHandler,
    WaitForIdatHandler, WaitForInfiniumMetricsHandler,
};
use crate::impls::StaticSchedulerContext;
use crate::ports::{
    BulkLoader, Clock, IdGenerator, MetricsSource, ProcessLauncher, QcStore, SchedulerContext, StateStore,
    SystemClock, UlidGenerator,
};

use super::config::EngineConfig;
use super::coordinator::Coordinator;
use super::state_manager::StateManager;
use super::task_manager::TaskManager;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing handlers for task kinds: {0:?}. These kinds were expected but not registered.")]
    MissingHandlers(Vec<TaskKindTag>),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct EngineBuilder {
    config: EngineConfig,
    registry: HandlerRegistry,
    expected_kinds: Option<Vec<TaskKindTag>>,
    default_handlers: bool,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    scheduler: Option<Arc<dyn SchedulerContext>>,
    loader: Option<Arc<dyn BulkLoader>>,
    metrics: Option<Arc<dyn MetricsSource>>,
    qc: Option<Arc<dyn QcStore>>,
    store: Option<Arc<dyn StateStore>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            expected_kinds: None,
            default_handlers: true,
            launcher: None,
            scheduler: None,
            loader: None,
            metrics: None,
            qc: None,
            store: None,
            clock: Arc::new(SystemClock),
            ids: None,
        }
    }

    /// Registers a custom handler. Defaults never replace it.
    pub fn register<H: TaskHandler + 'static>(mut self, handler: H) -> Result<Self, RegistryError> {
        self.registry.register(handler)?;
        Ok(self)
    }

    pub fn expect_kinds(mut self, kinds: &[TaskKindTag]) -> Self {
        self.expected_kinds = Some(kinds.to_vec());
        self
    }

    /// Only explicitly registered handlers are used.
    pub fn without_default_handlers(mut self) -> Self {
        self.default_handlers = false;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn SchedulerContext>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn BulkLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn metrics_source(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn qc_store(mut self, qc: Arc<dyn QcStore>) -> Self {
        self.qc = Some(qc);
        self
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Registers the built-in handlers whose collaborators were supplied.
    fn register_defaults(&mut self) {
        let clock = self.clock.clone();
        self.registry.register_missing(ProcessTaskHandler::new(clock.clone()));
        self.registry
            .register_missing(DeleteFolderHandler::new(clock.clone(), self.config.retention()));
        self.registry.register_missing(WaitForIdatHandler::new(
            clock.clone(),
            self.config.infinium_data_path.clone(),
        ));
        if let Some(qc) = &self.qc {
            self.registry
                .register_missing(WaitForInfiniumMetricsHandler::new(clock.clone(), qc.clone()));
        }
        if let (Some(loader), Some(metrics)) = (&self.loader, &self.metrics) {
            let uploader = Arc::new(MetricsUploader::new(loader.clone(), self.config.loader.clone()));
            self.registry.register_missing(DemultiplexMetricsHandler::new(
                clock.clone(),
                metrics.clone(),
                uploader.clone(),
            ));
            self.registry.register_missing(AlignmentMetricsHandler::new(
                clock.clone(),
                metrics.clone(),
                uploader.clone(),
            ));
            self.registry
                .register_missing(FingerprintUploadHandler::new(clock, metrics.clone(), uploader));
        }
    }

    pub fn build(mut self) -> Result<Coordinator, BuildError> {
        if self.default_handlers {
            self.register_defaults();
        }
        if let Some(expected) = &self.expected_kinds {
            let registered = self.registry.registered_kinds();
            let missing: Vec<TaskKindTag> = expected
                .iter()
                .filter(|kind| !registered.contains(*kind))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingHandlers(missing));
            }
        }

        let launcher = self
            .launcher
            .ok_or(BuildError::MissingCollaborator("process launcher"))?;
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(StaticSchedulerContext::new()) as Arc<dyn SchedulerContext>);
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(self.clock.clone())) as Arc<dyn IdGenerator>);

        let task_manager = TaskManager::new(
            launcher,
            self.registry,
            self.clock.clone(),
            self.config.process_deadline(),
            self.config.wait_deadline(),
        );
        Ok(Coordinator::new(
            task_manager,
            StateManager::with_default_hooks(self.clock.clone(), ids),
            ReviewGate::new(self.clock),
            scheduler,
            self.store,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::upload::testing::ScriptedLoader;
    use crate::impls::{DragenSimulator, InMemoryMetricsSource, InMemoryQcStore};

    #[test]
    fn launcher_is_required() {
        let err = EngineBuilder::new(EngineConfig::default()).build().err().unwrap();
        assert!(matches!(err, BuildError::MissingCollaborator("process launcher")));
    }

    #[test]
    fn metrics_kinds_need_loader_and_source() {
        let err = EngineBuilder::new(EngineConfig::default())
            .launcher(Arc::new(DragenSimulator::new()))
            .qc_store(Arc::new(InMemoryQcStore::new()))
            .expect_kinds(&[
                TaskKindTag::Alignment,
                TaskKindTag::WaitForInfiniumMetrics,
                TaskKindTag::AlignmentMetrics,
                TaskKindTag::FingerprintUpload,
            ])
            .build()
            .err()
            .unwrap();

        assert!(matches!(
            err,
            BuildError::MissingHandlers(missing)
                if missing == vec![TaskKindTag::AlignmentMetrics, TaskKindTag::FingerprintUpload]
        ));
    }

    #[test]
    fn full_wiring_covers_every_handled_kind() {
        let coordinator = EngineBuilder::new(EngineConfig::default())
            .launcher(Arc::new(DragenSimulator::new()))
            .loader(Arc::new(ScriptedLoader::default()))
            .metrics_source(Arc::new(InMemoryMetricsSource::new()))
            .qc_store(Arc::new(InMemoryQcStore::new()))
            .build()
            .unwrap();

        let unhandled: Vec<TaskKindTag> = TaskKindTag::ALL
            .into_iter()
            .filter(|kind| !coordinator.task_manager().handlers().registered_kinds().contains(kind))
            .collect();
        assert_eq!(unhandled, vec![TaskKindTag::WaitForFile, TaskKindTag::WaitForReview]);
    }

    #[test]
    fn without_defaults_nothing_is_registered() {
        let err = EngineBuilder::new(EngineConfig::default())
            .launcher(Arc::new(DragenSimulator::new()))
            .without_default_handlers()
            .expect_kinds(&[TaskKindTag::Demultiplex])
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::MissingHandlers(missing) if missing == vec![TaskKindTag::Demultiplex]));
    }
}
