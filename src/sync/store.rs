use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::ProjectId;

use super::collaborators::{SyncState, SyncStateStore};

/// Process-local store. Survives nothing; meant for embedding hosts that
/// persist elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<SyncState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> SyncState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SyncStateStore for MemoryStateStore {
    async fn get(&self) -> Result<SyncState> {
        let guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        Ok(*guard)
    }

    async fn set(&self, last_sync: DateTime<Utc>, project_id: ProjectId) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("sync state lock poisoned"))?;
        *guard = SyncState {
            last_sync: Some(last_sync),
            last_project_id: Some(project_id),
        };
        Ok(())
    }
}
