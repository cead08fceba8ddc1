use super::super::args::*;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let global = cli.global;
    match cli.cmd {
        Command::Run(args) => super::run::run(args, &global).await,
        Command::Runs(args) => match args.cmd {
            RunsSub::List { prompt, json } => {
                super::runs::cmd_list(&global, prompt.as_deref(), json).await
            }
            RunsSub::Show { run_id, json } => super::runs::cmd_show(&global, &run_id, json).await,
        },
        Command::Summary(args) => super::summary::run(args, &global).await,
        Command::TestSet(args) => match args.cmd {
            TestSetSub::Info { json } => super::test_set::cmd_info(&global, json).await,
            TestSetSub::Cases {
                category,
                limit,
                offset,
                json,
            } => {
                super::test_set::cmd_cases(&global, category.as_deref(), limit, offset, json).await
            }
        },
        Command::Compare(args) => super::compare::run(args, &global).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
