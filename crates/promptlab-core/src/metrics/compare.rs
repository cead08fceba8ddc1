//! Baseline comparison between two completed runs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{Run, RunId, Verdict};

/// Default accuracy delta (absolute) below/above which a change counts.
pub const DEFAULT_REGRESSION_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Regression,
    Improvement,
    NoChange,
}

/// Accuracy delta and per-case changes between a baseline and a current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub baseline_run: RunId,
    pub current_run: RunId,
    pub baseline_accuracy: f64,
    pub current_accuracy: f64,
    /// `current - baseline`.
    pub delta: f64,
    pub threshold: f64,
    pub outcome: ComparisonOutcome,
    /// Correct in the baseline, wrong now.
    pub newly_failed: Vec<Verdict>,
    /// Wrong in the baseline, correct now.
    pub newly_fixed: Vec<Verdict>,
}

impl Comparison {
    pub fn is_regression(&self) -> bool {
        self.outcome == ComparisonOutcome::Regression
    }
}

/// Compare two runs. Returns `None` unless both are completed.
///
/// Cases are matched by test id; cases present in only one run are ignored.
pub fn compare_runs(baseline: &Run, current: &Run, threshold: f64) -> Option<Comparison> {
    let baseline_metrics = baseline.metrics()?;
    let current_metrics = current.metrics()?;
    let baseline_verdicts = baseline.verdicts()?;
    let current_verdicts = current.verdicts()?;

    let baseline_accuracy = baseline_metrics.overall_accuracy;
    let current_accuracy = current_metrics.overall_accuracy;
    let delta = current_accuracy - baseline_accuracy;

    let outcome = if delta < -threshold {
        ComparisonOutcome::Regression
    } else if delta > threshold {
        ComparisonOutcome::Improvement
    } else {
        ComparisonOutcome::NoChange
    };

    let by_id: HashMap<i64, &Verdict> = baseline_verdicts.iter().map(|v| (v.test_id, v)).collect();

    let mut newly_failed = Vec::new();
    let mut newly_fixed = Vec::new();
    for v in current_verdicts {
        let Some(prev) = by_id.get(&v.test_id) else {
            continue;
        };
        match (prev.is_correct, v.is_correct) {
            (true, false) => newly_failed.push(v.clone()),
            (false, true) => newly_fixed.push(v.clone()),
            _ => {}
        }
    }

    Some(Comparison {
        baseline_run: baseline.id.clone(),
        current_run: current.id.clone(),
        baseline_accuracy,
        current_accuracy,
        delta,
        threshold,
        outcome,
        newly_failed,
        newly_fixed,
    })
}
