//! Run persistence.
//!
//! Backends:
//!
//! - [`FileRunStore`]: one JSON document per run
//! - [`SqliteRunStore`]: single SQLite table
//! - [`MemoryRunStore`]: process-local map

mod file;
mod memory;
mod sqlite;

pub use file::FileRunStore;
pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Run, RunId, RunStatus};

/// Storage for run records, keyed by run id.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new record. Fails with `StoreError::AlreadyExists` when the id is taken.
    async fn create(&self, run: &Run) -> StoreResult<()>;

    /// Insert or replace a record.
    async fn save(&self, run: &Run) -> StoreResult<()>;

    /// Replace the record only while its stored status is `expected`.
    ///
    /// The check and the write are atomic with respect to other
    /// `transition` calls. Returns `false`, leaving the record untouched,
    /// when the status differs or the record does not exist.
    async fn transition(&self, run: &Run, expected: RunStatus) -> StoreResult<bool>;

    async fn load(&self, run_id: &RunId) -> StoreResult<Option<Run>>;

    /// All runs, newest first.
    async fn list(&self) -> StoreResult<Vec<Run>>;

    /// Runs of one prompt, newest first.
    async fn list_by_prompt(&self, prompt_id: &str) -> StoreResult<Vec<Run>> {
        let mut runs = self.list().await?;
        runs.retain(|r| r.prompt_id == prompt_id);
        Ok(runs)
    }
}

/// Newest first; ties broken by id, descending.
pub(crate) fn sort_newest_first(runs: &mut [Run]) {
    runs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
