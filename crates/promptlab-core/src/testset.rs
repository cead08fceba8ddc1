//! Labeled test set: provider trait, JSON loader, and descriptive queries.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{TestSetError, TestSetResult};
use crate::model::TestCase;

/// Default page size for [`select_cases`].
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page size accepted by [`select_cases`].
pub const MAX_PAGE_LIMIT: usize = 200;

/// Supplies the ordered test set. Must return the same cases on every call.
#[async_trait]
pub trait TestSetProvider: Send + Sync {
    async fn load_test_set(&self) -> TestSetResult<Vec<TestCase>>;
}

/// Test set stored as a JSON array of `{id, ticket, expected, intent?}`.
#[derive(Debug, Clone)]
pub struct JsonTestSet {
    path: PathBuf,
}

impl JsonTestSet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TestSetProvider for JsonTestSet {
    async fn load_test_set(&self) -> TestSetResult<Vec<TestCase>> {
        let path = self.path.display().to_string();
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| TestSetError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let cases: Vec<TestCase> =
            serde_json::from_str(&content).map_err(|e| TestSetError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        validate(&cases)?;
        debug!(path = %path, cases = cases.len(), "loaded test set");
        Ok(cases)
    }
}

/// In-memory test set.
#[derive(Debug, Clone, Default)]
pub struct StaticTestSet {
    cases: Vec<TestCase>,
}

impl StaticTestSet {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl TestSetProvider for StaticTestSet {
    async fn load_test_set(&self) -> TestSetResult<Vec<TestCase>> {
        validate(&self.cases)?;
        Ok(self.cases.clone())
    }
}

/// Ids must be unique and texts non-empty.
fn validate(cases: &[TestCase]) -> TestSetResult<()> {
    let mut seen = HashSet::with_capacity(cases.len());
    for case in cases {
        if !seen.insert(case.id) {
            return Err(TestSetError::DuplicateId { id: case.id });
        }
        if case.text.trim().is_empty() {
            return Err(TestSetError::EmptyText { id: case.id });
        }
    }
    Ok(())
}

/// Size and category distribution of a test set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSetInfo {
    pub total: usize,
    /// Sorted expected categories.
    pub categories: Vec<String>,
    pub category_counts: BTreeMap<String, usize>,
}

pub fn test_set_info(cases: &[TestCase]) -> TestSetInfo {
    let mut category_counts = BTreeMap::new();
    for case in cases {
        *category_counts
            .entry(case.expected_category.clone())
            .or_insert(0) += 1;
    }
    TestSetInfo {
        total: cases.len(),
        categories: category_counts.keys().cloned().collect(),
        category_counts,
    }
}

/// One page of test cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSetPage {
    /// Matching cases before pagination.
    pub total: usize,
    /// All categories of the full set.
    pub categories: Vec<String>,
    pub cases: Vec<TestCase>,
}

/// Filter by expected category (case-insensitive) and paginate.
///
/// `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
pub fn select_cases(
    cases: &[TestCase],
    category: Option<&str>,
    limit: usize,
    offset: usize,
) -> TestSetPage {
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let wanted = category
        .filter(|c| !c.is_empty())
        .map(|c| c.to_uppercase());

    let matching: Vec<&TestCase> = cases
        .iter()
        .filter(|c| wanted.as_deref().map_or(true, |w| c.expected_category == w))
        .collect();

    TestSetPage {
        total: matching.len(),
        categories: test_set_info(cases).categories,
        cases: matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect(),
    }
}
