//! StateStore port: persistence of states with their tasks.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{State, StateId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state {0} not found")]
    NotFound(StateId),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored state is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, id: StateId) -> Result<State, StoreError>;

    async fn save(&self, state: &State) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<StateId>, StoreError>;
}
