use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{read_json_or_init, write_json_atomic};
use crate::types::CycleState;

/// Persistence for the single global [`CycleState`].
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Current state. A store that has never been written returns (and persists) the
    /// zero value.
    async fn load(&self) -> Result<CycleState, StoreError>;

    async fn save(&self, state: &CycleState) -> Result<(), StoreError>;
}

/// Cycle state in a small JSON file next to the record store.
#[derive(Debug)]
pub struct JsonCycleStore {
    path: Option<PathBuf>,
    state: Mutex<Option<CycleState>>,
}

impl JsonCycleStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl CycleStore for JsonCycleStore {
    async fn load(&self) -> Result<CycleState, StoreError> {
        let mut cached = self.state.lock().await;
        if let Some(state) = *cached {
            return Ok(state);
        }
        let state = match &self.path {
            Some(path) => read_json_or_init(path, CycleState::default).await?,
            None => CycleState::default(),
        };
        *cached = Some(state);
        Ok(state)
    }

    async fn save(&self, state: &CycleState) -> Result<(), StoreError> {
        let mut cached = self.state.lock().await;
        if let Some(path) = &self.path {
            write_json_atomic(path, state).await?;
        }
        *cached = Some(*state);
        Ok(())
    }
}
