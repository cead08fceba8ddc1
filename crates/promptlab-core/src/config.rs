//! Application configuration.
//!
//! Loaded from an optional YAML file, then overridden from the environment.
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```yaml
//! data_dir: data
//! storage:
//!   backend: sqlite
//! classifier:
//!   model: gpt-4o-mini
//!   max_retries: 5
//! execution:
//!   request_delay_ms: 250
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{CategorySet, ClassifierConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::metrics::compare::DEFAULT_REGRESSION_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root for the test set, prompts and runs.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Test set file; `<data_dir>/test_set.json` when unset.
    #[serde(default)]
    pub test_set: Option<PathBuf>,

    /// Prompt directory; `<data_dir>/prompts` when unset.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub categories: CategorySet,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub comparison: ComparisonConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            test_set: None,
            prompts_dir: None,
            storage: StorageConfig::default(),
            classifier: ClassifierConfig::default(),
            categories: CategorySet::default(),
            execution: ExecutionConfig::default(),
            comparison: ComparisonConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Runs directory (file) or database file (sqlite). Derived from
    /// `data_dir` when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Pause between consecutive classifier calls within a run.
    #[serde(default)]
    pub request_delay_ms: u64,

    /// Upper bound on runs executing at once.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_max_concurrent_runs() -> usize {
    2
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 0,
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl ExecutionConfig {
    pub fn request_delay(&self) -> Option<Duration> {
        (self.request_delay_ms > 0).then(|| Duration::from_millis(self.request_delay_ms))
    }

    pub fn with_request_delay_ms(mut self, ms: u64) -> Self {
        self.request_delay_ms = ms;
        self
    }

    pub fn with_max_concurrent_runs(mut self, n: usize) -> Self {
        self.max_concurrent_runs = n;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Absolute accuracy delta that counts as a regression or improvement.
    #[serde(default = "default_regression_threshold")]
    pub regression_threshold: f64,
}

fn default_regression_threshold() -> f64 {
    DEFAULT_REGRESSION_THRESHOLD
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            regression_threshold: default_regression_threshold(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(yaml: &str, origin: &str) -> ConfigResult<Self> {
        // serde_yaml rejects an empty document; treat it as all defaults.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Read and parse a config file. The file must exist.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: origin.clone(),
            message: e.to_string(),
        })?;
        let config = Self::from_yaml_str(&content, &origin)?;
        debug!(path = %origin, "loaded config");
        Ok(config)
    }

    /// Like [`AppConfig::from_path`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::from_path(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Override fields from the environment.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PROMPTLAB_DATA_DIR` | Data directory |
    /// | `PROMPTLAB_REQUEST_DELAY_MS` | Delay between classification calls |
    ///
    /// plus the classifier variables of [`ClassifierConfig::apply_env`].
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        if let Ok(dir) = std::env::var("PROMPTLAB_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(delay) = std::env::var("PROMPTLAB_REQUEST_DELAY_MS") {
            self.execution.request_delay_ms =
                delay.trim().parse().map_err(|_| ConfigError::Invalid {
                    message: format!("PROMPTLAB_REQUEST_DELAY_MS must be an integer, got {delay:?}"),
                })?;
        }
        self.classifier.apply_env();
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if self.execution.max_concurrent_runs == 0 {
            return invalid("execution.max_concurrent_runs must be at least 1");
        }
        let threshold = self.comparison.regression_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return invalid("comparison.regression_threshold must be non-negative");
        }
        if self.categories.labels.is_empty() {
            return invalid("categories.labels must not be empty");
        }
        if self.categories.fallback.trim().is_empty() {
            return invalid("categories.fallback must not be empty");
        }
        if self.classifier.base_url.trim().is_empty() {
            return invalid("classifier.base_url must not be empty");
        }
        Ok(())
    }

    pub fn test_set_path(&self) -> PathBuf {
        self.test_set
            .clone()
            .unwrap_or_else(|| self.data_dir.join("test_set.json"))
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.prompts_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("prompts"))
    }

    /// Location of the run store for the configured backend.
    pub fn runs_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.path {
            return path.clone();
        }
        match self.storage.backend {
            StorageBackend::Sqlite => self.data_dir.join("runs.db"),
            StorageBackend::File | StorageBackend::Memory => self.data_dir.join("runs"),
        }
    }
}
