//! State store keeping one JSON document per state.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ulid::Ulid;

use crate::domain::{State, StateId};
use crate::ports::{StateStore, StoreError};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: StateId) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", id.as_ulid()))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self, id: StateId) -> Result<State, StoreError> {
        let raw = match fs::read_to_string(self.path_for(id)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id)),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes to a sibling temp file first so a crash never leaves half a document.
    async fn save(&self, state: &State) -> Result<(), StoreError> {
        let path = self.path_for(state.id());
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StateId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let ulid = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Ulid::from_string(stem).ok());
            if let Some(ulid) = ulid {
                ids.push(StateId::from_ulid(ulid));
            }
        }
        ids.sort();
        Ok(ids)
    }
}
