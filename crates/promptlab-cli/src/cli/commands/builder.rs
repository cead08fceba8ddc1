use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use promptlab_core::{
    AppConfig, Classifier, FakeClassifier, FilePromptStore, FileRunStore, HttpClassifier,
    JsonTestSet, MemoryRunStore, PromptSource, RunManager, RunStore, SqliteRunStore,
    StorageBackend, TestSetProvider,
};

use super::super::args::{ClassifierKind, GlobalArgs};

const DEFAULT_CONFIG_FILE: &str = "promptlab.yaml";

/// Resolved configuration plus the collaborators every command needs.
/// The classifier is built separately so read-only commands never need an API key.
pub(crate) struct Workspace {
    pub config: AppConfig,
    pub store: Arc<dyn RunStore>,
    pub prompts: Arc<dyn PromptSource>,
    pub test_set: Arc<dyn TestSetProvider>,
}

impl Workspace {
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let config = load_config(global)?;
        let store = build_store(&config)?;
        let prompts: Arc<dyn PromptSource> = Arc::new(FilePromptStore::new(config.prompts_path()));
        let test_set: Arc<dyn TestSetProvider> = Arc::new(JsonTestSet::new(config.test_set_path()));
        Ok(Self {
            config,
            store,
            prompts,
            test_set,
        })
    }

    pub fn classifier(&self, global: &GlobalArgs) -> anyhow::Result<Arc<dyn Classifier>> {
        let classifier: Arc<dyn Classifier> = match global.classifier {
            ClassifierKind::Fake => Arc::new(
                FakeClassifier::new(global.fake_response.clone())
                    .with_categories(self.config.categories.clone()),
            ),
            ClassifierKind::Openai => Arc::new(
                HttpClassifier::new(
                    self.config.classifier.clone(),
                    Arc::clone(&self.prompts),
                    self.config.categories.clone(),
                )
                .context("failed to set up classifier")?,
            ),
        };
        Ok(classifier)
    }

    pub fn manager(&self, classifier: Arc<dyn Classifier>) -> RunManager {
        RunManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.test_set),
            classifier,
            Arc::clone(&self.prompts),
            self.config.execution.clone(),
        )
    }
}

/// File (explicit or default) → environment → command-line flags.
pub(crate) fn load_config(global: &GlobalArgs) -> anyhow::Result<AppConfig> {
    let mut config = match &global.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    config.apply_env()?;
    if let Some(dir) = &global.data_dir {
        config.data_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn RunStore>> {
    let path = config.runs_path();
    let store: Arc<dyn RunStore> = match config.storage.backend {
        StorageBackend::File => Arc::new(FileRunStore::new(path)),
        StorageBackend::Sqlite => Arc::new(
            SqliteRunStore::open(&path)
                .with_context(|| format!("failed to open run database {}", path.display()))?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("memory storage selected: runs are discarded on exit");
            Arc::new(MemoryRunStore::new())
        }
    };
    Ok(store)
}
