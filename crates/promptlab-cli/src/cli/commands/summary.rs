use promptlab_core::{summarize, PromptSource, RunStore, TestSetProvider};

use super::super::args::{GlobalArgs, SummaryArgs};
use super::builder::Workspace;
use super::report;
use crate::exit_codes::SUCCESS;

pub async fn run(args: SummaryArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let prompts = ws.prompts.list().await?;
    let runs = ws.store.list().await?;
    let test_set_size = ws.test_set.load_test_set().await?.len();
    let summary = summarize(&prompts, &runs, test_set_size);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::format_summary(&summary));
    }
    Ok(SUCCESS)
}
