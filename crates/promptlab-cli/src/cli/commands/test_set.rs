use promptlab_core::{select_cases, test_set_info, TestSetProvider};

use super::super::args::GlobalArgs;
use super::builder::Workspace;
use super::report;
use crate::exit_codes::SUCCESS;

pub async fn cmd_info(global: &GlobalArgs, json: bool) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let cases = ws.test_set.load_test_set().await?;
    let info = test_set_info(&cases);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{}", report::format_test_set_info(&info));
    }
    Ok(SUCCESS)
}

pub async fn cmd_cases(
    global: &GlobalArgs,
    category: Option<&str>,
    limit: usize,
    offset: usize,
    json: bool,
) -> anyhow::Result<i32> {
    let ws = Workspace::load(global)?;
    let cases = ws.test_set.load_test_set().await?;
    let page = select_cases(&cases, category, limit, offset);

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print!("{}", report::format_page(&page, offset));
    }
    Ok(SUCCESS)
}
