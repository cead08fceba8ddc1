use anyhow::Context;
use promptlab_core::{EngineError, Run, RunId, RunManager, RunStatus};
use serde_json::json;

use super::super::args::{GlobalArgs, RunArgs};
use super::builder::Workspace;
use super::report;
use crate::exit_codes::{NOT_FOUND, REGRESSION, RUN_FAILED, SUCCESS};

pub(crate) async fn run(args: RunArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let manager = ws.manager(ws.classifier(global)?);
    let threshold = args
        .threshold
        .unwrap_or(ws.config.comparison.regression_threshold);

    // Resolve the baseline first so a typo fails before any classifier calls.
    let baseline = match resolve_baseline(&manager, &args).await? {
        Baseline::None => None,
        Baseline::Run(run) => Some(run),
        Baseline::Missing(prompt) => {
            eprintln!("error: no completed run found for baseline prompt {prompt}");
            return Ok(NOT_FOUND);
        }
    };

    let (pending, handle) = manager.spawn(&args.prompt).await?;
    eprintln!("Started run {} for prompt {}", pending.id, args.prompt);

    let outcome = handle
        .await
        .map_err(|e| EngineError::Task {
            message: e.to_string(),
        })?;

    let finished = match outcome {
        Ok(run) => run,
        Err(e) => {
            let stored = manager.get(&pending.id).await.ok();
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "run": stored, "error": e.to_string() }))?
                );
            } else {
                match stored {
                    Some(run) => eprintln!("{}", report::format_status_line(&run)),
                    None => eprintln!("Run {} failed: {e}", pending.id),
                }
            }
            return Ok(RUN_FAILED);
        }
    };

    let comparison = match &baseline {
        Some(base) => Some(
            manager
                .compare(&base.id, &finished.id, threshold)
                .await
                .context("failed to compare with baseline")?,
        ),
        None => None,
    };

    let regressed = comparison.as_ref().is_some_and(|c| c.is_regression());
    if args.json {
        let body = json!({ "run": finished, "comparison": comparison });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", report::format_run(&finished));
        if let Some(cmp) = &comparison {
            println!();
            print!("{}", report::format_comparison(cmp));
        }
    }

    if regressed && args.fail_on_regression {
        return Ok(REGRESSION);
    }
    Ok(SUCCESS)
}

enum Baseline {
    None,
    Run(Run),
    Missing(String),
}

async fn resolve_baseline(manager: &RunManager, args: &RunArgs) -> anyhow::Result<Baseline> {
    if let Some(id) = &args.baseline_run {
        let run = manager
            .get(&RunId::from(id.as_str()))
            .await
            .context("failed to load baseline run")?;
        let status = run.status();
        if status != RunStatus::Completed {
            return Err(EngineError::InvalidState {
                run_id: run.id,
                status,
                action: "compare",
            }
            .into());
        }
        return Ok(Baseline::Run(run));
    }
    if let Some(prompt) = &args.baseline_prompt {
        return Ok(match manager.latest_completed(prompt).await? {
            Some(run) => Baseline::Run(run),
            None => Baseline::Missing(prompt.clone()),
        });
    }
    Ok(Baseline::None)
}
