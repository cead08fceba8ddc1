//! Read-only prompt lookup.
//!
//! Prompt authoring lives elsewhere; the engine only needs to check that a
//! prompt exists and to render its template for a ticket.
//!
//! # Layout
//!
//! ```text
//! <data>/prompts/{id}.json   # { "id", "name", "template", "created_at", ... }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{PromptError, PromptResult};

/// Placeholder replaced by the ticket text.
pub const TICKET_PLACEHOLDER: &str = "{ticket}";

/// A classification prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    /// Template text containing `{ticket}`.
    pub template: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Prompt {
    pub fn new(id: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            template: template.into(),
            categories: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Substitute the ticket text into the template.
    pub fn render(&self, ticket: &str) -> String {
        self.template.replace(TICKET_PLACEHOLDER, ticket)
    }
}

/// Source of prompt templates.
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// `None` when the prompt does not exist. A prompt file that exists but
    /// cannot be read or parsed is an error.
    async fn get(&self, prompt_id: &str) -> PromptResult<Option<Prompt>>;

    /// All prompts, oldest first.
    async fn list(&self) -> PromptResult<Vec<Prompt>>;
}

/// Prompts stored as one JSON file each.
#[derive(Debug, Clone)]
pub struct FilePromptStore {
    dir: PathBuf,
}

impl FilePromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn prompt_path(&self, prompt_id: &str) -> Option<PathBuf> {
        let safe = !prompt_id.is_empty()
            && !prompt_id.starts_with('.')
            && prompt_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        safe.then(|| self.dir.join(format!("{prompt_id}.json")))
    }

    async fn read_prompt(path: &Path) -> PromptResult<Prompt> {
        let content = fs::read_to_string(path).await.map_err(|e| PromptError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| PromptError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PromptSource for FilePromptStore {
    async fn get(&self, prompt_id: &str) -> PromptResult<Option<Prompt>> {
        let Some(path) = self.prompt_path(prompt_id) else {
            debug!(prompt_id, "prompt id is not a valid file name");
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::read_prompt(&path).await.map(Some)
    }

    async fn list(&self) -> PromptResult<Vec<Prompt>> {
        let mut prompts = Vec::new();
        if !self.dir.exists() {
            return Ok(prompts);
        }

        let io_err = |e: std::io::Error| PromptError::Io {
            path: self.dir.display().to_string(),
            message: e.to_string(),
        };

        let mut entries = fs::read_dir(&self.dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_prompt(&path).await {
                Ok(prompt) => prompts.push(prompt),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable prompt"),
            }
        }

        prompts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(prompts)
    }
}

/// Fixed in-memory prompt set.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptSource {
    prompts: Vec<Prompt>,
}

impl StaticPromptSource {
    pub fn new(prompts: Vec<Prompt>) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl PromptSource for StaticPromptSource {
    async fn get(&self, prompt_id: &str) -> PromptResult<Option<Prompt>> {
        Ok(self.prompts.iter().find(|p| p.id == prompt_id).cloned())
    }

    async fn list(&self) -> PromptResult<Vec<Prompt>> {
        Ok(self.prompts.clone())
    }
}
