//! Classifier gateway.
//!
//! A [`Classifier`] maps `(ticket text, prompt id)` to one category label.
//! Implementations:
//!
//! - [`HttpClassifier`]: OpenAI-compatible chat completions with retry.
//! - [`FakeClassifier`]: fixed answer, for offline runs.
//! - [`ScriptedClassifier`]: queued answers and errors, for tests.

mod fake;
mod http;

pub use fake::{FakeClassifier, ScriptedClassifier};
pub use http::HttpClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierResult;

/// Default taxonomy, in scan order.
pub const DEFAULT_CATEGORIES: [&str; 11] = [
    "ACCOUNT",
    "CANCEL",
    "CONTACT",
    "DELIVERY",
    "FEEDBACK",
    "INVOICE",
    "ORDER",
    "PAYMENT",
    "REFUND",
    "SHIPPING",
    "SUBSCRIPTION",
];

/// Returned when no known category appears in the answer.
pub const DEFAULT_FALLBACK_CATEGORY: &str = "CONTACT";

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one ticket with the given prompt.
    async fn classify(&self, text: &str, prompt_id: &str) -> ClassifierResult<String>;

    fn name(&self) -> &'static str;
}

/// Ordered category labels plus a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

fn default_labels() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK_CATEGORY.to_string()
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            fallback: default_fallback(),
        }
    }
}

impl CategorySet {
    pub fn new(labels: impl IntoIterator<Item = impl Into<String>>, fallback: impl Into<String>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            fallback: fallback.into(),
        }
    }

    /// Map a free-text answer onto a label.
    ///
    /// Scans `labels` in order and returns the first one contained in the
    /// trimmed, uppercased answer. Earlier labels win when several match.
    pub fn normalize(&self, answer: &str) -> String {
        let upper = answer.trim().to_uppercase();
        self.labels
            .iter()
            .find(|label| upper.contains(label.to_uppercase().as_str()))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Settings for [`HttpClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    50
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClassifierConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from the environment.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PROMPTLAB_CLASSIFIER_URL` | Base URL |
    /// | `PROMPTLAB_CLASSIFIER_MODEL` | Model name |
    /// | `PROMPTLAB_CLASSIFIER_API_KEY` | API key (falls back to `OPENAI_API_KEY`) |
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PROMPTLAB_CLASSIFIER_URL") {
            self.base_url = url;
        }
        if let Ok(model) = std::env::var("PROMPTLAB_CLASSIFIER_MODEL") {
            self.model = model;
        }
        if let Some(key) = std::env::var("PROMPTLAB_CLASSIFIER_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
        {
            self.api_key = Some(key);
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}
