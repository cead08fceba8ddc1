//! Data model: test cases, verdicts, aggregates and the run record.
//!
//! Wire names follow the on-disk run format (`ticket`, `expected`,
//! `predicted`, `correct`, `results`), so records written by earlier tooling
//! load unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::metrics::ERROR_SENTINEL;

/// One labeled case of the test set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,

    /// Ticket text sent to the classifier.
    #[serde(rename = "ticket", alias = "text")]
    pub text: String,

    #[serde(rename = "expected", alias = "expected_category")]
    pub expected_category: String,

    /// Fine-grained intent from the source dataset. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl TestCase {
    pub fn new(id: i64, text: impl Into<String>, expected_category: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            expected_category: expected_category.into(),
            intent: None,
        }
    }
}

/// Outcome of classifying one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub test_id: i64,

    #[serde(rename = "ticket")]
    pub text: String,

    #[serde(rename = "expected")]
    pub expected_category: String,

    /// `None` when the classifier call failed.
    #[serde(rename = "predicted")]
    pub predicted_category: Option<String>,

    #[serde(rename = "correct")]
    pub is_correct: bool,

    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Verdict {
    /// Verdict for a successful classification.
    pub fn classified(case: &TestCase, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            test_id: case.id,
            text: case.text.clone(),
            expected_category: case.expected_category.clone(),
            is_correct: label == case.expected_category,
            predicted_category: Some(label),
            error_message: None,
        }
    }

    /// Verdict for a classification that raised an error.
    pub fn errored(case: &TestCase, message: impl Into<String>) -> Self {
        Self {
            test_id: case.id,
            text: case.text.clone(),
            expected_category: case.expected_category.clone(),
            predicted_category: None,
            is_correct: false,
            error_message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.predicted_category.is_none()
    }
}

/// Total/correct counters for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub total: usize,
    pub correct: usize,
}

impl CategoryStat {
    /// correct / total, `0.0` for an empty category.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Per-category counters keyed by expected category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryStats(BTreeMap<String, CategoryStat>);

impl CategoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, expected: &str, correct: bool) {
        let stat = self.0.entry(expected.to_string()).or_default();
        stat.total += 1;
        if correct {
            stat.correct += 1;
        }
    }

    pub fn get(&self, category: &str) -> Option<&CategoryStat> {
        self.0.get(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryStat)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> usize {
        self.0.values().map(|s| s.total).sum()
    }

    pub fn correct(&self) -> usize {
        self.0.values().map(|s| s.correct).sum()
    }
}

impl FromIterator<(String, CategoryStat)> for CategoryStats {
    fn from_iter<I: IntoIterator<Item = (String, CategoryStat)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Counts of (actual → predicted) category pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfusionMatrix(BTreeMap<String, BTreeMap<String, usize>>);

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, actual: &str, predicted: &str) {
        *self
            .0
            .entry(actual.to_string())
            .or_default()
            .entry(predicted.to_string())
            .or_insert(0) += 1;
    }

    pub fn count(&self, actual: &str, predicted: &str) -> usize {
        self.0
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn row(&self, actual: &str) -> Option<&BTreeMap<String, usize>> {
        self.0.get(actual)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, usize>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sum of all cells.
    pub fn total(&self) -> usize {
        self.0.values().flat_map(|row| row.values()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Aggregate accuracy numbers for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub overall_accuracy: f64,
    pub correct: usize,
    pub total: usize,
    pub category_stats: CategoryStats,
}

/// A verdict with `is_correct == false`, shaped for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCase {
    pub test_id: i64,

    #[serde(rename = "ticket")]
    pub text: String,

    #[serde(rename = "expected")]
    pub expected_category: String,

    /// Predicted label, or the `"ERROR"` sentinel when classification failed.
    /// Older records store `null` here; it reads back as the sentinel.
    #[serde(
        rename = "predicted",
        default = "error_sentinel",
        deserialize_with = "null_as_sentinel"
    )]
    pub predicted_category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn error_sentinel() -> String {
    ERROR_SENTINEL.to_string()
}

fn null_as_sentinel<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(error_sentinel))
}

/// Run identifier: `{prompt}_{utc timestamp}_{random suffix}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a time-ordered id for `prompt_id`.
    ///
    /// Ids for the same prompt sort by creation time; the random suffix keeps
    /// ids created within the same millisecond distinct.
    pub fn generate(prompt_id: &str, now: DateTime<Utc>) -> Self {
        let prompt: String = prompt_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}_{}",
            prompt,
            now.format("%Y%m%dT%H%M%S%.3fZ"),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id can be used as a file name without escaping its directory.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a completed run carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub metrics: Metrics,
    pub confusion_matrix: ConfusionMatrix,
    pub verdicts: Vec<Verdict>,
    pub failed_cases: Vec<FailedCase>,
}

/// State of a run. Result fields exist only on the terminal variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed {
        completed_at: DateTime<Utc>,
        metrics: Metrics,
        confusion_matrix: ConfusionMatrix,
        #[serde(rename = "results")]
        verdicts: Vec<Verdict>,
        failed_cases: Vec<FailedCase>,
    },
    Failed {
        completed_at: DateTime<Utc>,
        error: String,
    },
}

/// Persisted evaluation of one prompt against the test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub prompt_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RunState,
}

impl Run {
    /// New run in the `pending` state.
    pub fn pending(id: RunId, prompt_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            prompt_id: prompt_id.into(),
            created_at,
            state: RunState::Pending,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self.state {
            RunState::Pending => RunStatus::Pending,
            RunState::Running => RunStatus::Running,
            RunState::Completed { .. } => RunStatus::Completed,
            RunState::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// `pending → running`.
    pub fn start(self) -> EngineResult<Self> {
        match self.state {
            RunState::Pending => Ok(Self {
                state: RunState::Running,
                ..self
            }),
            _ => Err(self.invalid("start")),
        }
    }

    /// `running → completed`.
    pub fn complete(self, outcome: RunOutcome, at: DateTime<Utc>) -> EngineResult<Self> {
        match self.state {
            RunState::Running => Ok(Self {
                state: RunState::Completed {
                    completed_at: at,
                    metrics: outcome.metrics,
                    confusion_matrix: outcome.confusion_matrix,
                    verdicts: outcome.verdicts,
                    failed_cases: outcome.failed_cases,
                },
                ..self
            }),
            _ => Err(self.invalid("complete")),
        }
    }

    /// `running → failed`.
    pub fn fail(self, error: impl Into<String>, at: DateTime<Utc>) -> EngineResult<Self> {
        match self.state {
            RunState::Running => Ok(Self {
                state: RunState::Failed {
                    completed_at: at,
                    error: error.into(),
                },
                ..self
            }),
            _ => Err(self.invalid("fail")),
        }
    }

    fn invalid(&self, action: &'static str) -> EngineError {
        EngineError::InvalidState {
            run_id: self.id.clone(),
            status: self.status(),
            action,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            RunState::Completed { completed_at, .. } | RunState::Failed { completed_at, .. } => {
                Some(*completed_at)
            }
            _ => None,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.state {
            RunState::Completed { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    pub fn confusion_matrix(&self) -> Option<&ConfusionMatrix> {
        match &self.state {
            RunState::Completed {
                confusion_matrix, ..
            } => Some(confusion_matrix),
            _ => None,
        }
    }

    pub fn verdicts(&self) -> Option<&[Verdict]> {
        match &self.state {
            RunState::Completed { verdicts, .. } => Some(verdicts),
            _ => None,
        }
    }

    pub fn failed_cases(&self) -> Option<&[FailedCase]> {
        match &self.state {
            RunState::Completed { failed_cases, .. } => Some(failed_cases),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            RunState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}
