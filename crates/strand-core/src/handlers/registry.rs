//! HandlerRegistry: task kind -> handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::TaskKindTag;

use super::TaskHandler;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task kind '{0}' is already registered")]
    AlreadyRegistered(TaskKindTag),
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKindTag, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every kind it declares. Nothing is registered
    /// if any of them is already taken.
    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) -> Result<(), RegistryError> {
        if let Some(taken) = handler
            .kinds()
            .iter()
            .find(|kind| self.handlers.contains_key(*kind))
        {
            return Err(RegistryError::AlreadyRegistered(*taken));
        }
        let handler: Arc<dyn TaskHandler> = Arc::new(handler);
        for kind in handler.kinds() {
            self.handlers.insert(*kind, handler.clone());
        }
        Ok(())
    }

    /// Registers `handler` only for the kinds nobody claimed yet.
    pub fn register_missing<H: TaskHandler + 'static>(&mut self, handler: H) {
        let handler: Arc<dyn TaskHandler> = Arc::new(handler);
        for kind in handler.kinds() {
            self.handlers
                .entry(*kind)
                .or_insert_with(|| handler.clone());
        }
    }

    pub fn get(&self, kind: TaskKindTag) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<TaskKindTag> {
        let mut kinds: Vec<TaskKindTag> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
