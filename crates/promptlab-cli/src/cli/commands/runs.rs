use promptlab_core::{EngineError, RunId, RunStore};

use super::super::args::GlobalArgs;
use super::builder::Workspace;
use super::report;
use crate::exit_codes::SUCCESS;

pub async fn cmd_list(global: &GlobalArgs, prompt: Option<&str>, json: bool) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let runs = match prompt {
        Some(id) => ws.store.list_by_prompt(id).await?,
        None => ws.store.list().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else {
        print!("{}", report::format_run_list(&runs));
    }
    Ok(SUCCESS)
}

pub async fn cmd_show(global: &GlobalArgs, run_id: &str, json: bool) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let run_id = RunId::from(run_id);
    let run = ws
        .store
        .load(&run_id)
        .await?
        .ok_or(EngineError::RunNotFound { run_id })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print!("{}", report::format_run(&run));
    }
    Ok(SUCCESS)
}
