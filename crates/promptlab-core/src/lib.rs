//! Run execution and metrics engine for prompt classification evaluation.
//!
//! This crate drives a labeled test set through a classifier for a given
//! prompt, records one verdict per case, and derives:
//!
//! - overall accuracy
//! - per-category accuracy (grouped by expected category)
//! - a confusion matrix (actual → predicted)
//! - the failed-case list
//!
//! Every evaluation is a persisted [`Run`] that moves through
//! `pending → running → completed | failed`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use promptlab_core::{
//!     FakeClassifier, FilePromptStore, JsonTestSet, MemoryRunStore, RunManager,
//!     ExecutionConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RunManager::new(
//!     Arc::new(MemoryRunStore::new()),
//!     Arc::new(JsonTestSet::new("data/test_set.json")),
//!     Arc::new(FakeClassifier::new("ORDER")),
//!     Arc::new(FilePromptStore::new("data/prompts")),
//!     ExecutionConfig::default(),
//! );
//!
//! let run = manager.create("v1").await?;
//! let run = manager.execute(&run.id, "v1").await?;
//! if let Some(metrics) = run.metrics() {
//!     println!("accuracy: {:.1}%", metrics.overall_accuracy * 100.0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PROMPTLAB_DATA_DIR` | Data directory (test set, prompts, runs) |
//! | `PROMPTLAB_CLASSIFIER_URL` | Chat-completions base URL |
//! | `PROMPTLAB_CLASSIFIER_MODEL` | Model name |
//! | `PROMPTLAB_CLASSIFIER_API_KEY` | API key (falls back to `OPENAI_API_KEY`) |
//! | `PROMPTLAB_REQUEST_DELAY_MS` | Delay between classification calls |

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod prompts;
pub mod storage;
pub mod testset;

pub use classifier::{
    CategorySet, Classifier, ClassifierConfig, FakeClassifier, HttpClassifier,
    ScriptedClassifier, DEFAULT_CATEGORIES, DEFAULT_FALLBACK_CATEGORY,
};
pub use config::{AppConfig, ComparisonConfig, ExecutionConfig, StorageBackend, StorageConfig};
pub use engine::{RunManager, RunQueue};
pub use error::{
    ClassifierError, ClassifierResult, ConfigError, ConfigResult, EngineError, EngineResult,
    PromptError, PromptResult, StoreError, StoreResult, TestSetError, TestSetResult,
};
pub use metrics::compare::{compare_runs, Comparison, ComparisonOutcome};
pub use metrics::summary::{summarize, MetricsSummary, PromptSummary};
pub use metrics::{aggregate, Aggregate, ERROR_SENTINEL};
pub use model::{
    CategoryStat, CategoryStats, ConfusionMatrix, FailedCase, Metrics, Run, RunId, RunOutcome,
    RunState, RunStatus, TestCase, Verdict,
};
pub use prompts::{FilePromptStore, Prompt, PromptSource, StaticPromptSource};
pub use storage::{FileRunStore, MemoryRunStore, RunStore, SqliteRunStore};
pub use testset::{
    select_cases, test_set_info, JsonTestSet, StaticTestSet, TestSetPage, TestSetInfo,
    TestSetProvider,
};
