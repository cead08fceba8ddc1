use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{sort_newest_first, RunStore};
use crate::error::StoreError;
use crate::model::{Run, RunId, RunStatus};

/// In-memory store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: RwLock<BTreeMap<RunId, Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(StoreError::AlreadyExists {
                run_id: run.id.clone(),
            });
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn save(&self, run: &Run) -> Result<(), StoreError> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn transition(&self, run: &Run, expected: RunStatus) -> Result<bool, StoreError> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.id) {
            Some(stored) if stored.status() == expected => {
                *stored = run.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Run>, StoreError> {
        let mut runs: Vec<Run> = self.runs.read().await.values().cloned().collect();
        sort_newest_first(&mut runs);
        Ok(runs)
    }
}
