use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use promptlab_core::{
    ClassifierError, EngineError, ExecutionConfig, FakeClassifier, FilePromptStore, FileRunStore,
    JsonTestSet, MemoryRunStore, Prompt, PromptError, Run, RunId, RunManager, RunStatus,
    RunStore, ScriptedClassifier, SqliteRunStore, StaticPromptSource, StaticTestSet, StoreError,
    StoreResult, TestCase, TestSetError, TestSetProvider, ERROR_SENTINEL,
};
use tempfile::TempDir;

struct BrokenTestSet;

#[async_trait]
impl TestSetProvider for BrokenTestSet {
    async fn load_test_set(&self) -> Result<Vec<TestCase>, TestSetError> {
        Err(TestSetError::Io {
            path: "data/test_set.json".to_string(),
            message: "No such file or directory".to_string(),
        })
    }
}

/// Memory store whose `save` fails on the given 1-based call numbers.
struct FlakyStore {
    inner: MemoryRunStore,
    failing_saves: Vec<usize>,
    saves: AtomicUsize,
}

impl FlakyStore {
    fn failing_on(failing_saves: Vec<usize>) -> Self {
        Self {
            inner: MemoryRunStore::new(),
            failing_saves,
            saves: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn create(&self, run: &Run) -> StoreResult<()> {
        self.inner.create(run).await
    }

    async fn save(&self, run: &Run) -> StoreResult<()> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_saves.contains(&n) {
            return Err(StoreError::Io {
                message: format!("disk full (save #{n})"),
            });
        }
        self.inner.save(run).await
    }

    async fn transition(&self, run: &Run, expected: RunStatus) -> StoreResult<bool> {
        self.inner.transition(run, expected).await
    }

    async fn load(&self, run_id: &RunId) -> StoreResult<Option<Run>> {
        self.inner.load(run_id).await
    }

    async fn list(&self) -> StoreResult<Vec<Run>> {
        self.inner.list().await
    }
}

fn prompts() -> Arc<StaticPromptSource> {
    Arc::new(StaticPromptSource::new(vec![
        Prompt::new("v1", "Baseline", "Classify: {ticket}"),
        Prompt::new("v2", "Few-shot", "Examples...\n{ticket}"),
    ]))
}

fn manager_with(
    store: Arc<dyn RunStore>,
    test_set: Arc<dyn TestSetProvider>,
    classifier: Arc<dyn promptlab_core::Classifier>,
) -> RunManager {
    RunManager::new(store, test_set, classifier, prompts(), ExecutionConfig::default())
}

#[tokio::test]
async fn test_two_case_example_end_to_end() {
    let m = manager_with(
        Arc::new(MemoryRunStore::new()),
        Arc::new(StaticTestSet::new(vec![
            TestCase::new(1, "x", "A"),
            TestCase::new(2, "y", "B"),
        ])),
        Arc::new(ScriptedClassifier::answering(["A", "A"])),
    );

    let run = m.create("v1").await.unwrap();
    let run = m.execute(&run.id, "v1").await.unwrap();

    assert_eq!(run.status(), RunStatus::Completed);
    let metrics = run.metrics().unwrap();
    assert_eq!((metrics.correct, metrics.total), (1, 2));
    assert!((metrics.overall_accuracy - 0.5).abs() < f64::EPSILON);

    let a = metrics.category_stats.get("A").unwrap();
    assert_eq!((a.total, a.correct), (1, 1));
    let b = metrics.category_stats.get("B").unwrap();
    assert_eq!((b.total, b.correct), (1, 0));

    let matrix = run.confusion_matrix().unwrap();
    assert_eq!(matrix.count("A", "A"), 1);
    assert_eq!(matrix.count("B", "A"), 1);

    let failed = run.failed_cases().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].test_id, 2);
    assert_eq!(failed[0].expected_category, "B");
    assert_eq!(failed[0].predicted_category, "A");
    assert!(run.completed_at().unwrap() >= run.created_at);
}

#[tokio::test]
async fn test_partial_classifier_failure_still_completes() {
    let m = manager_with(
        Arc::new(MemoryRunStore::new()),
        Arc::new(StaticTestSet::new(vec![
            TestCase::new(1, "a", "ORDER"),
            TestCase::new(2, "b", "REFUND"),
            TestCase::new(3, "c", "REFUND"),
        ])),
        Arc::new(ScriptedClassifier::new(vec![
            Ok("ORDER".to_string()),
            Err(ClassifierError::Network {
                message: "connection reset".to_string(),
            }),
            Ok("REFUND".to_string()),
        ])),
    );

    let run = m.create("v1").await.unwrap();
    let run = m.execute(&run.id, "v1").await.unwrap();
    assert_eq!(run.status(), RunStatus::Completed);

    let verdicts = run.verdicts().unwrap();
    let errored: Vec<_> = verdicts.iter().filter(|v| v.is_error()).collect();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].test_id, 2);
    assert!(errored[0].predicted_category.is_none());
    assert!(!errored[0].is_correct);

    let metrics = run.metrics().unwrap();
    assert_eq!((metrics.correct, metrics.total), (2, 3));
    assert_eq!(run.confusion_matrix().unwrap().total(), 2);

    let failed = run.failed_cases().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].predicted_category, ERROR_SENTINEL);
    assert!(failed[0].error.as_deref().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_test_set_failure_marks_run_failed() {
    let store = Arc::new(MemoryRunStore::new());
    let m = manager_with(
        store.clone(),
        Arc::new(BrokenTestSet),
        Arc::new(FakeClassifier::new("ORDER")),
    );

    let run = m.create("v1").await.unwrap();
    let err = m.execute(&run.id, "v1").await.unwrap_err();
    assert!(matches!(err, EngineError::TestSet(TestSetError::Io { .. })));

    let stored = store.load(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), RunStatus::Failed);
    assert_eq!(stored.error(), Some(err.to_string().as_str()));
    assert!(stored.metrics().is_none());
    assert!(stored.completed_at().is_some());
}

#[tokio::test]
async fn test_terminal_runs_cannot_be_executed_again() {
    let m = manager_with(
        Arc::new(MemoryRunStore::new()),
        Arc::new(BrokenTestSet),
        Arc::new(FakeClassifier::new("ORDER")),
    );
    let run = m.create("v1").await.unwrap();
    m.execute(&run.id, "v1").await.unwrap_err();
    let before = m.get(&run.id).await.unwrap();

    let err = m.execute(&run.id, "v1").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            status: RunStatus::Failed,
            ..
        }
    ));
    assert_eq!(m.get(&run.id).await.unwrap(), before);
}

#[tokio::test]
async fn test_empty_test_set_completes_with_zeroes() {
    let m = manager_with(
        Arc::new(MemoryRunStore::new()),
        Arc::new(StaticTestSet::new(Vec::new())),
        Arc::new(FakeClassifier::new("ORDER")),
    );
    let run = m.create("v1").await.unwrap();
    let run = m.execute(&run.id, "v1").await.unwrap();

    let metrics = run.metrics().unwrap();
    assert_eq!(metrics.overall_accuracy, 0.0);
    assert_eq!(metrics.total, 0);
    assert!(run.confusion_matrix().unwrap().is_empty());
    assert!(run.failed_cases().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_returns_pending_and_finishes_in_background() {
    let m = manager_with(
        Arc::new(MemoryRunStore::new()),
        Arc::new(StaticTestSet::new(vec![TestCase::new(1, "where is my parcel", "DELIVERY")])),
        Arc::new(FakeClassifier::new("delivery")),
    );

    let run = m.start("v2").await.unwrap();
    assert_eq!(run.status(), RunStatus::Pending);

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = m.get(&run.id).await.unwrap();
            if current.is_terminal() {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(finished.status(), RunStatus::Completed);
    assert_eq!(finished.metrics().unwrap().overall_accuracy, 1.0);
}

#[tokio::test]
async fn test_spawned_failure_is_reported_through_handle() {
    let m = manager_with(
        Arc::new(MemoryRunStore::new()),
        Arc::new(BrokenTestSet),
        Arc::new(FakeClassifier::new("ORDER")),
    );
    let (run, handle) = m.spawn("v1").await.unwrap();
    assert!(matches!(handle.await.unwrap(), Err(EngineError::TestSet(_))));
    assert_eq!(m.get(&run.id).await.unwrap().status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_runs_persist_on_disk_and_list_newest_first() {
    let tmp = TempDir::new().unwrap();
    let test_set_path = tmp.path().join("test_set.json");
    std::fs::write(
        &test_set_path,
        r#"[{"id": 1, "ticket": "cancel my subscription", "expected": "SUBSCRIPTION"}]"#,
    )
    .unwrap();

    let store: Arc<dyn RunStore> = Arc::new(FileRunStore::new(tmp.path().join("runs")));
    let m = manager_with(
        store,
        Arc::new(JsonTestSet::new(&test_set_path)),
        Arc::new(FakeClassifier::new("SUBSCRIPTION")),
    );

    let first = m.create("v1").await.unwrap();
    m.execute(&first.id, "v1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = m.create("v2").await.unwrap();

    let all = m.list(None).await.unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

    let v1 = m.list(Some("v1")).await.unwrap();
    assert_eq!(v1.len(), 1);
    assert_eq!(v1[0].status(), RunStatus::Completed);

    let summary = m.summary().await.unwrap();
    assert_eq!(summary.total_runs, 2);
    assert_eq!(summary.test_set_size, 1);
    assert_eq!(summary.best_prompt.as_deref(), Some("v1"));
}

async fn assert_each_run_executes_once(store: Arc<dyn RunStore>) {
    const ROUNDS: usize = 20;
    let classifier = Arc::new(ScriptedClassifier::answering(vec!["ORDER"; ROUNDS * 2]));
    let m = manager_with(
        store,
        Arc::new(StaticTestSet::new(vec![
            TestCase::new(1, "where is my order", "ORDER"),
            TestCase::new(2, "refund please", "REFUND"),
        ])),
        classifier.clone(),
    );

    for _ in 0..ROUNDS {
        let run = m.create("v1").await.unwrap();
        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let m = m.clone();
                let run_id = run.id.clone();
                tokio::spawn(async move { m.execute(&run_id, "v1").await })
            })
            .collect();

        let (mut completed, mut rejected) = (0, 0);
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(run) => {
                    assert_eq!(run.status(), RunStatus::Completed);
                    completed += 1;
                }
                Err(EngineError::InvalidState { action, .. }) => {
                    assert_eq!(action, "execute");
                    rejected += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((completed, rejected), (1, 1));
        assert_eq!(m.get(&run.id).await.unwrap().status(), RunStatus::Completed);
    }

    // Two cases per run; a second execution would have classified them again.
    assert_eq!(classifier.calls().len(), ROUNDS * 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_execute_runs_once_in_memory() {
    assert_each_run_executes_once(Arc::new(MemoryRunStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_execute_runs_once_on_disk() {
    let tmp = TempDir::new().unwrap();
    assert_each_run_executes_once(Arc::new(FileRunStore::new(tmp.path().join("runs")))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_execute_runs_once_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteRunStore::open(&tmp.path().join("runs.db")).unwrap();
    assert_each_run_executes_once(Arc::new(store)).await;
}

#[tokio::test]
async fn test_store_failure_on_completion_marks_run_failed() {
    let store = Arc::new(FlakyStore::failing_on(vec![1]));
    let m = manager_with(
        store.clone(),
        Arc::new(StaticTestSet::new(vec![TestCase::new(1, "x", "ORDER")])),
        Arc::new(FakeClassifier::new("ORDER")),
    );

    let run = m.create("v1").await.unwrap();
    let err = m.execute(&run.id, "v1").await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Io { .. })));
    assert_eq!(err.to_string(), "run store io error: disk full (save #1)");

    let stored = store.load(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), RunStatus::Failed);
    assert_eq!(stored.error(), Some(err.to_string().as_str()));
    assert!(stored.metrics().is_none());
    assert!(stored.completed_at().is_some());
}

#[tokio::test]
async fn test_failed_save_of_failure_returns_original_error() {
    let store = Arc::new(FlakyStore::failing_on(vec![1, 2]));
    let m = manager_with(
        store.clone(),
        Arc::new(StaticTestSet::new(vec![TestCase::new(1, "x", "ORDER")])),
        Arc::new(FakeClassifier::new("ORDER")),
    );

    let run = m.create("v1").await.unwrap();
    let err = m.execute(&run.id, "v1").await.unwrap_err();
    assert!(err.to_string().contains("save #1"), "got: {err}");

    // Neither terminal state reached the store.
    let stored = store.load(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), RunStatus::Running);
}

#[tokio::test]
async fn test_corrupt_prompt_file_is_not_reported_as_missing() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("v1.json"), "{\"id\": \"v1\"").unwrap();

    let m = RunManager::new(
        Arc::new(MemoryRunStore::new()),
        Arc::new(StaticTestSet::new(Vec::new())),
        Arc::new(FakeClassifier::new("ORDER")),
        Arc::new(FilePromptStore::new(tmp.path())),
        ExecutionConfig::default(),
    );

    let err = m.create("v1").await.unwrap_err();
    assert!(matches!(err, EngineError::Prompt(PromptError::Parse { .. })));
    assert!(!err.is_not_found());
    assert!(matches!(
        m.create("v2").await.unwrap_err(),
        EngineError::PromptNotFound { .. }
    ));
}
