use promptlab_core::{compare_runs, EngineError, Run, RunId, RunStatus, RunStore};

use super::super::args::{CompareArgs, GlobalArgs};
use super::builder::Workspace;
use super::report;
use crate::exit_codes::{REGRESSION, SUCCESS};

pub async fn run(args: CompareArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let threshold = args
        .threshold
        .unwrap_or(ws.config.comparison.regression_threshold);

    let baseline = load_completed(ws.store.as_ref(), &args.baseline_run).await?;
    let current = load_completed(ws.store.as_ref(), &args.current_run).await?;
    let cmp = compare_runs(&baseline, &current, threshold).ok_or_else(|| {
        EngineError::InvalidState {
            run_id: current.id.clone(),
            status: current.status(),
            action: "compare",
        }
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&cmp)?);
    } else {
        print!("{}", report::format_comparison(&cmp));
    }

    if cmp.is_regression() && args.fail_on_regression {
        return Ok(REGRESSION);
    }
    Ok(SUCCESS)
}

async fn load_completed(store: &dyn RunStore, id: &str) -> anyhow::Result<Run> {
    let run_id = RunId::from(id);
    let run = store
        .load(&run_id)
        .await?
        .ok_or(EngineError::RunNotFound { run_id })?;
    let status = run.status();
    if status != RunStatus::Completed {
        return Err(EngineError::InvalidState {
            run_id: run.id,
            status,
            action: "compare",
        }
        .into());
    }
    Ok(run)
}
