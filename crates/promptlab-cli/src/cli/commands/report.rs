//! Plain-text rendering for terminal output. Pure string builders so the
//! layout is unit-testable; callers decide where the text goes.

use std::fmt::Write as _;

use promptlab_core::{
    Comparison, ComparisonOutcome, MetricsSummary, Run, RunStatus, TestSetInfo, TestSetPage,
};

/// Failed cases shown before truncating.
const MAX_FAILED_SHOWN: usize = 20;

pub(crate) fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// Header, metrics, per-category accuracy and failed cases of one run.
#[must_use]
pub(crate) fn format_run(run: &Run) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {}", run.id);
    let _ = writeln!(out, "  prompt:  {}", run.prompt_id);
    let _ = writeln!(out, "  status:  {}", run.status());
    let _ = writeln!(out, "  created: {}", run.created_at.to_rfc3339());
    if let Some(at) = run.completed_at() {
        let _ = writeln!(out, "  finished: {}", at.to_rfc3339());
    }

    if let Some(error) = run.error() {
        let _ = writeln!(out, "  error:   {error}");
        return out;
    }

    let Some(metrics) = run.metrics() else {
        return out;
    };
    let _ = writeln!(
        out,
        "\nAccuracy: {} ({}/{})",
        percent(metrics.overall_accuracy),
        metrics.correct,
        metrics.total
    );

    if !metrics.category_stats.is_empty() {
        let _ = writeln!(out, "\nBy category:");
        for (category, stat) in metrics.category_stats.iter() {
            let _ = writeln!(
                out,
                "  {:<14} {:>6}  ({}/{})",
                category,
                percent(stat.accuracy()),
                stat.correct,
                stat.total
            );
        }
    }

    let failed = run.failed_cases().unwrap_or_default();
    if !failed.is_empty() {
        let _ = writeln!(out, "\nFailed cases ({}):", failed.len());
        for case in failed.iter().take(MAX_FAILED_SHOWN) {
            let _ = write!(
                out,
                "  #{:<5} expected {:<12} got {:<12} {}",
                case.test_id,
                case.expected_category,
                case.predicted_category,
                truncate(&case.text, 60)
            );
            if let Some(err) = &case.error {
                let _ = write!(out, "  [{}]", truncate(err, 60));
            }
            out.push('\n');
        }
        if failed.len() > MAX_FAILED_SHOWN {
            let _ = writeln!(out, "  ... and {} more", failed.len() - MAX_FAILED_SHOWN);
        }
    }
    out
}

#[must_use]
pub(crate) fn format_run_list(runs: &[Run]) -> String {
    if runs.is_empty() {
        return "No runs found.\n".to_string();
    }
    let mut out = String::new();
    for run in runs {
        let accuracy = run
            .metrics()
            .map(|m| percent(m.overall_accuracy))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<44} {:<10} {:<10} {:>7}  {}",
            run.id.as_str(),
            run.prompt_id,
            run.status().as_str(),
            accuracy,
            run.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}

#[must_use]
pub(crate) fn format_summary(summary: &MetricsSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Test set: {} cases, {} runs total",
        summary.test_set_size, summary.total_runs
    );
    let opt = |v: Option<f64>| v.map(percent).unwrap_or_else(|| "-".to_string());
    for p in &summary.prompts {
        let marker = if summary.best_prompt.as_deref() == Some(p.id.as_str()) {
            "*"
        } else {
            " "
        };
        let _ = writeln!(
            out,
            "{} {:<10} {:<24} latest {:>7}  best {:>7}  runs {}",
            marker,
            p.id,
            truncate(&p.name, 24),
            opt(p.latest_accuracy),
            opt(p.best_accuracy),
            p.run_count
        );
    }
    if let Some(best) = &summary.best_prompt {
        let _ = writeln!(out, "Best prompt: {best}");
    }
    out
}

#[must_use]
pub(crate) fn format_comparison(cmp: &Comparison) -> String {
    let mut out = String::new();
    let verdict = match cmp.outcome {
        ComparisonOutcome::Regression => "REGRESSION",
        ComparisonOutcome::Improvement => "improvement",
        ComparisonOutcome::NoChange => "no significant change",
    };
    let _ = writeln!(
        out,
        "Baseline {} {} -> {} {}: {:+.1} pts ({}, threshold {:.1} pts)",
        cmp.baseline_run,
        percent(cmp.baseline_accuracy),
        cmp.current_run,
        percent(cmp.current_accuracy),
        cmp.delta * 100.0,
        verdict,
        cmp.threshold * 100.0
    );
    for (label, list) in [("Newly failed", &cmp.newly_failed), ("Newly fixed", &cmp.newly_fixed)] {
        if list.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{label} ({}):", list.len());
        for v in list.iter().take(MAX_FAILED_SHOWN) {
            let _ = writeln!(
                out,
                "  #{:<5} expected {:<12} got {:<12} {}",
                v.test_id,
                v.expected_category,
                v.predicted_category.as_deref().unwrap_or("ERROR"),
                truncate(&v.text, 60)
            );
        }
    }
    out
}

#[must_use]
pub(crate) fn format_test_set_info(info: &TestSetInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} cases, {} categories", info.total, info.categories.len());
    for (category, count) in &info.category_counts {
        let _ = writeln!(out, "  {category:<14} {count}");
    }
    out
}

#[must_use]
pub(crate) fn format_page(page: &TestSetPage, offset: usize) -> String {
    let mut out = String::new();
    let end = offset + page.cases.len();
    let _ = writeln!(
        out,
        "Showing {}-{} of {}",
        if page.cases.is_empty() { offset } else { offset + 1 },
        end,
        page.total
    );
    for case in &page.cases {
        let _ = writeln!(
            out,
            "  #{:<5} {:<14} {}",
            case.id,
            case.expected_category,
            truncate(&case.text, 70)
        );
    }
    out
}

/// One line per run status change, for stderr.
#[must_use]
pub(crate) fn format_status_line(run: &Run) -> String {
    match run.status() {
        RunStatus::Completed => format!(
            "Run {} completed: {}",
            run.id,
            run.metrics()
                .map(|m| percent(m.overall_accuracy))
                .unwrap_or_default()
        ),
        RunStatus::Failed => format!("Run {} failed: {}", run.id, run.error().unwrap_or_default()),
        status => format!("Run {} {}", run.id, status),
    }
}
