//! Verdict aggregation.
//!
//! Pure functions over a verdict slice. Grouping is commutative, so the
//! result does not depend on verdict order; the failed-case list keeps the
//! input order.

pub mod compare;
pub mod summary;

use crate::model::{CategoryStats, ConfusionMatrix, FailedCase, Metrics, RunOutcome, Verdict};

/// Predicted label shown for cases whose classification failed.
pub const ERROR_SENTINEL: &str = "ERROR";

/// Everything derived from one verdict sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub metrics: Metrics,
    pub confusion_matrix: ConfusionMatrix,
    pub failed_cases: Vec<FailedCase>,
}

impl Aggregate {
    /// Attach the verdicts to build a completed-run payload.
    pub fn into_outcome(self, verdicts: Vec<Verdict>) -> RunOutcome {
        RunOutcome {
            metrics: self.metrics,
            confusion_matrix: self.confusion_matrix,
            verdicts,
            failed_cases: self.failed_cases,
        }
    }
}

/// Compute metrics, confusion matrix and failed cases in one call.
pub fn aggregate(verdicts: &[Verdict]) -> Aggregate {
    Aggregate {
        metrics: compute_metrics(verdicts),
        confusion_matrix: confusion_matrix(verdicts),
        failed_cases: failed_cases(verdicts),
    }
}

/// Overall and per-category accuracy. Categories are keyed by the expected label.
pub fn compute_metrics(verdicts: &[Verdict]) -> Metrics {
    let total = verdicts.len();
    let mut correct = 0;
    let mut category_stats = CategoryStats::new();

    for v in verdicts {
        if v.is_correct {
            correct += 1;
        }
        category_stats.record(&v.expected_category, v.is_correct);
    }

    let overall_accuracy = if total > 0 {
        correct as f64 / total as f64
    } else {
        0.0
    };

    Metrics {
        overall_accuracy,
        correct,
        total,
        category_stats,
    }
}

/// Expected → predicted counts. Verdicts without a prediction have no cell.
pub fn confusion_matrix(verdicts: &[Verdict]) -> ConfusionMatrix {
    let mut matrix = ConfusionMatrix::new();
    for v in verdicts {
        if let Some(predicted) = &v.predicted_category {
            matrix.record(&v.expected_category, predicted);
        }
    }
    matrix
}

/// Every incorrect verdict, in input order.
pub fn failed_cases(verdicts: &[Verdict]) -> Vec<FailedCase> {
    verdicts
        .iter()
        .filter(|v| !v.is_correct)
        .map(|v| FailedCase {
            test_id: v.test_id,
            text: v.text.clone(),
            expected_category: v.expected_category.clone(),
            predicted_category: v
                .predicted_category
                .clone()
                .unwrap_or_else(|| ERROR_SENTINEL.to_string()),
            error: v.error_message.clone(),
        })
        .collect()
}
