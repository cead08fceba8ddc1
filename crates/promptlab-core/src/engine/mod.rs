//! Run lifecycle.
//!
//! [`RunManager`] owns the `pending → running → completed | failed` state
//! machine. Every transition is persisted before the next step starts, so a
//! crash leaves the last reached state on disk.

mod queue;

pub use queue::RunQueue;

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::config::ExecutionConfig;
use crate::error::{EngineError, EngineResult};
use crate::metrics::aggregate;
use crate::metrics::compare::{compare_runs, Comparison};
use crate::metrics::summary::{summarize, MetricsSummary};
use crate::model::{Run, RunId, RunOutcome, RunStatus, Verdict};
use crate::prompts::PromptSource;
use crate::storage::RunStore;
use crate::testset::TestSetProvider;

/// Creates, executes and queries runs.
#[derive(Clone)]
pub struct RunManager {
    store: Arc<dyn RunStore>,
    test_set: Arc<dyn TestSetProvider>,
    classifier: Arc<dyn Classifier>,
    prompts: Arc<dyn PromptSource>,
    execution: ExecutionConfig,
    queue: RunQueue,
}

impl RunManager {
    pub fn new(
        store: Arc<dyn RunStore>,
        test_set: Arc<dyn TestSetProvider>,
        classifier: Arc<dyn Classifier>,
        prompts: Arc<dyn PromptSource>,
        execution: ExecutionConfig,
    ) -> Self {
        let queue = RunQueue::new(execution.max_concurrent_runs);
        Self {
            store,
            test_set,
            classifier,
            prompts,
            execution,
            queue,
        }
    }

    pub fn queue(&self) -> &RunQueue {
        &self.queue
    }

    /// Persist a new `pending` run for an existing prompt.
    pub async fn create(&self, prompt_id: &str) -> EngineResult<Run> {
        if self.prompts.get(prompt_id).await?.is_none() {
            return Err(EngineError::PromptNotFound {
                prompt_id: prompt_id.to_string(),
            });
        }

        let now = Utc::now();
        let run = Run::pending(RunId::generate(prompt_id, now), prompt_id, now);
        self.store.create(&run).await?;
        info!(run_id = %run.id, prompt_id, "run created");
        Ok(run)
    }

    /// Evaluate a `pending` run against the full test set.
    ///
    /// Per-case classifier errors become failing verdicts. Any other error
    /// marks the run `failed` with the error message and is returned.
    pub async fn execute(&self, run_id: &RunId, prompt_id: &str) -> EngineResult<Run> {
        let run = self.get(run_id).await?;

        let status = run.status();
        if status != RunStatus::Pending {
            return Err(EngineError::InvalidState {
                run_id: run.id,
                status,
                action: "execute",
            });
        }
        if run.prompt_id != prompt_id {
            return Err(EngineError::PromptMismatch {
                run_id: run.id,
                expected: run.prompt_id,
                actual: prompt_id.to_string(),
            });
        }

        // A concurrent execute may have claimed the run since it was loaded.
        let run = run.start()?;
        if !self.store.transition(&run, RunStatus::Pending).await? {
            let status = self.get(&run.id).await?.status();
            return Err(EngineError::InvalidState {
                run_id: run.id,
                status,
                action: "execute",
            });
        }
        info!(run_id = %run.id, prompt_id, "run started");

        let outcome = match self.evaluate(&run).await {
            Ok(outcome) => outcome,
            Err(e) => return self.mark_failed(run, e).await,
        };

        let accuracy = outcome.metrics.overall_accuracy;
        let failed = outcome.failed_cases.len();
        let completed = run.clone().complete(outcome, Utc::now())?;
        if let Err(e) = self.store.save(&completed).await {
            return self.mark_failed(run, e.into()).await;
        }

        info!(
            run_id = %completed.id,
            prompt_id,
            accuracy,
            failed_cases = failed,
            "run completed"
        );
        Ok(completed)
    }

    async fn evaluate(&self, run: &Run) -> EngineResult<RunOutcome> {
        let cases = self.test_set.load_test_set().await?;
        let delay = self.execution.request_delay();
        let mut verdicts = Vec::with_capacity(cases.len());

        for (i, case) in cases.iter().enumerate() {
            if let (Some(delay), true) = (delay, i > 0) {
                tokio::time::sleep(delay).await;
            }

            let verdict = match self.classifier.classify(&case.text, &run.prompt_id).await {
                Ok(label) => {
                    debug!(run_id = %run.id, test_id = case.id, predicted = %label, "classified case");
                    Verdict::classified(case, label)
                }
                Err(e) => {
                    warn!(run_id = %run.id, test_id = case.id, error = %e, "classification failed");
                    Verdict::errored(case, e.to_string())
                }
            };
            verdicts.push(verdict);
        }

        Ok(aggregate(&verdicts).into_outcome(verdicts))
    }

    /// Persist the `failed` state and hand back the original error.
    async fn mark_failed(&self, run: Run, err: EngineError) -> EngineResult<Run> {
        let run_id = run.id.clone();
        let failed = run.fail(err.to_string(), Utc::now())?;
        if let Err(save_err) = self.store.save(&failed).await {
            error!(run_id = %run_id, error = %save_err, "failed to persist failed run");
        }
        error!(run_id = %run_id, error = %err, "run failed");
        Err(err)
    }

    pub async fn get(&self, run_id: &RunId) -> EngineResult<Run> {
        self.store
            .load(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound {
                run_id: run_id.clone(),
            })
    }

    /// Runs, newest first, optionally for one prompt.
    pub async fn list(&self, prompt_id: Option<&str>) -> EngineResult<Vec<Run>> {
        let runs = match prompt_id {
            Some(id) => self.store.list_by_prompt(id).await?,
            None => self.store.list().await?,
        };
        Ok(runs)
    }

    /// Create a run and queue its execution. Returns the `pending` record.
    pub async fn start(&self, prompt_id: &str) -> EngineResult<Run> {
        let (run, _handle) = self.spawn(prompt_id).await?;
        Ok(run)
    }

    /// Like [`RunManager::start`], also returning the execution handle.
    pub async fn spawn(&self, prompt_id: &str) -> EngineResult<(Run, JoinHandle<EngineResult<Run>>)> {
        let run = self.create(prompt_id).await?;
        let manager = self.clone();
        let run_id = run.id.clone();
        let prompt = prompt_id.to_string();
        let handle = self
            .queue
            .submit(run.id.clone(), async move { manager.execute(&run_id, &prompt).await });
        Ok((run, handle))
    }

    /// Most recent completed run of a prompt.
    pub async fn latest_completed(&self, prompt_id: &str) -> EngineResult<Option<Run>> {
        Ok(self
            .store
            .list_by_prompt(prompt_id)
            .await?
            .into_iter()
            .find(|r| r.status() == RunStatus::Completed))
    }

    /// Compare two stored runs. Both must be completed.
    pub async fn compare(
        &self,
        baseline: &RunId,
        current: &RunId,
        threshold: f64,
    ) -> EngineResult<Comparison> {
        let baseline = self.get(baseline).await?;
        let current = self.get(current).await?;
        for run in [&baseline, &current] {
            if run.status() != RunStatus::Completed {
                return Err(EngineError::InvalidState {
                    run_id: run.id.clone(),
                    status: run.status(),
                    action: "compare",
                });
            }
        }
        compare_runs(&baseline, &current, threshold).ok_or_else(|| EngineError::InvalidState {
            run_id: current.id.clone(),
            status: current.status(),
            action: "compare",
        })
    }

    /// Accuracy summary across all known prompts.
    pub async fn summary(&self) -> EngineResult<MetricsSummary> {
        let prompts = self.prompts.list().await?;
        let runs = self.store.list().await?;
        let test_set_size = self.test_set.load_test_set().await?.len();
        Ok(summarize(&prompts, &runs, test_set_size))
    }
}
