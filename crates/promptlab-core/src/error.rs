//! Error types for the evaluation engine.

use std::time::Duration;

use crate::model::{RunId, RunStatus};

/// Classifier gateway errors.
///
/// A `ClassifierError` only ever fails a single test case; the run manager
/// records it on the verdict and moves on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    /// The prompt id has no template.
    #[error("unknown prompt: {prompt_id}")]
    UnknownPrompt { prompt_id: String },

    /// API key rejected.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure or non-success status.
    #[error("network error: {message}")]
    Network { message: String },

    /// Service answered but the payload could not be read.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Gateway misconfiguration (e.g. missing API key).
    #[error("classifier configuration error: {message}")]
    Config { message: String },
}

impl ClassifierError {
    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Run store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this id already exists.
    #[error("run already exists: {run_id}")]
    AlreadyExists { run_id: RunId },

    #[error("run store io error: {message}")]
    Io { message: String },

    #[error("run store serialization error: {message}")]
    Serialization { message: String },

    #[error("run store database error: {message}")]
    Database { message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Test set provider errors.
#[derive(Debug, thiserror::Error)]
pub enum TestSetError {
    #[error("failed to read test set {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse test set {path}: {message}")]
    Parse { path: String, message: String },

    /// Two cases share an id.
    #[error("duplicate test case id {id} in test set")]
    DuplicateId { id: i64 },

    #[error("test case {id} has empty text")]
    EmptyText { id: i64 },
}

/// Prompt lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to read prompts from {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse prompt {path}: {message}")]
    Parse { path: String, message: String },
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Run lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No run with this id.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: RunId },

    /// No prompt with this id.
    #[error("prompt not found: {prompt_id}")]
    PromptNotFound { prompt_id: String },

    /// The run is not in a state that allows the requested transition.
    #[error("invalid state for run {run_id}: cannot {action} a {status} run")]
    InvalidState {
        run_id: RunId,
        status: RunStatus,
        action: &'static str,
    },

    /// `execute` was called with a prompt other than the one the run was created for.
    #[error("run {run_id} was created for prompt {expected}, not {actual}")]
    PromptMismatch {
        run_id: RunId,
        expected: String,
        actual: String,
    },

    /// Generated run id collided with an existing record.
    #[error("duplicate run id: {run_id}")]
    DuplicateRun { run_id: RunId },

    #[error(transparent)]
    TestSet(#[from] TestSetError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The queued task panicked or was aborted.
    #[error("run task failed: {message}")]
    Task { message: String },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { run_id } => Self::DuplicateRun { run_id },
            other => Self::Store(other),
        }
    }
}

impl EngineError {
    /// Lookup failures (unknown run or prompt), as opposed to fatal run errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RunNotFound { .. } | Self::PromptNotFound { .. })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

pub type ClassifierResult<T> = Result<T, ClassifierError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type TestSetResult<T> = Result<T, TestSetError>;
pub type PromptResult<T> = Result<T, PromptError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
