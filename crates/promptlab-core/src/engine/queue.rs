//! Bounded background execution of runs.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, Instrument};

use crate::error::{EngineError, EngineResult};
use crate::model::{Run, RunId};

/// Submit-and-return queue. At most `capacity` submitted runs execute at
/// once; the rest wait for a permit in submission order.
#[derive(Debug, Clone)]
pub struct RunQueue {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl RunQueue {
    /// `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs currently holding a permit.
    pub fn active(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Spawn `task` once a permit is free. Failures are logged here as well
    /// as returned through the handle, so dropping the handle loses nothing.
    pub fn submit<F>(&self, run_id: RunId, task: F) -> JoinHandle<EngineResult<Run>>
    where
        F: Future<Output = EngineResult<Run>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let span = info_span!("queued_run", run_id = %run_id);

        tokio::spawn(
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::Task {
                        message: e.to_string(),
                    })?;
                debug!("run acquired execution slot");

                let result = task.await;
                if let Err(e) = &result {
                    error!(run_id = %run_id, error = %e, "queued run failed");
                }
                result
            }
            .instrument(span),
        )
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new(2)
    }
}
