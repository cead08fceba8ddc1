//! Cross-prompt accuracy summary.

use serde::{Deserialize, Serialize};

use crate::model::Run;
use crate::prompts::Prompt;

/// Accuracy history for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: String,
    pub name: String,
    /// Accuracy of the most recently created completed run.
    pub latest_accuracy: Option<f64>,
    /// Number of completed runs.
    pub run_count: usize,
    pub best_accuracy: Option<f64>,
}

/// Summary across all prompts, in prompt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub prompts: Vec<PromptSummary>,
    /// Prompt with the highest best accuracy (must be above zero).
    pub best_prompt: Option<String>,
    /// All runs, whatever their status.
    pub total_runs: usize,
    pub test_set_size: usize,
}

impl MetricsSummary {
    pub fn prompt(&self, id: &str) -> Option<&PromptSummary> {
        self.prompts.iter().find(|p| p.id == id)
    }
}

/// Build the summary. Only completed runs contribute accuracy figures.
pub fn summarize(prompts: &[Prompt], runs: &[Run], test_set_size: usize) -> MetricsSummary {
    let mut best_prompt = None;
    let mut best_accuracy = 0.0_f64;
    let mut summaries = Vec::with_capacity(prompts.len());

    for prompt in prompts {
        let completed: Vec<(&Run, f64)> = runs
            .iter()
            .filter(|r| r.prompt_id == prompt.id)
            .filter_map(|r| r.metrics().map(|m| (r, m.overall_accuracy)))
            .collect();

        let latest_accuracy = completed
            .iter()
            .fold(None::<(&Run, f64)>, |acc, &(run, accuracy)| match acc {
                Some((latest, _)) if latest.created_at >= run.created_at => acc,
                _ => Some((run, accuracy)),
            })
            .map(|(_, accuracy)| accuracy);

        let prompt_best = completed
            .iter()
            .map(|&(_, accuracy)| accuracy)
            .fold(None::<f64>, |acc, a| Some(acc.map_or(a, |b| b.max(a))));

        if let Some(best) = prompt_best {
            if best > best_accuracy {
                best_accuracy = best;
                best_prompt = Some(prompt.id.clone());
            }
        }

        summaries.push(PromptSummary {
            id: prompt.id.clone(),
            name: prompt.name.clone(),
            latest_accuracy,
            run_count: completed.len(),
            best_accuracy: prompt_best,
        });
    }

    MetricsSummary {
        prompts: summaries,
        best_prompt,
        total_runs: runs.len(),
        test_set_size,
    }
}
