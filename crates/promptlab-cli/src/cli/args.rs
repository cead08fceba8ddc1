use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "promptlab",
    version,
    about = "Evaluate classification prompts against a labeled test set"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (YAML). `promptlab.yaml` is used when present.
    #[arg(long, global = true, env = "PROMPTLAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory; overrides config and PROMPTLAB_DATA_DIR
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Classifier backend
    #[arg(long, global = true, value_enum, default_value_t = ClassifierKind::Openai)]
    pub classifier: ClassifierKind,

    /// Fixed answer for `--classifier fake`
    #[arg(long, global = true, default_value = "CONTACT")]
    pub fake_response: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClassifierKind {
    /// OpenAI-compatible chat completions
    Openai,
    /// Same answer for every ticket (offline)
    Fake,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate a prompt against the full test set
    Run(RunArgs),
    /// Inspect stored runs
    Runs(RunsArgs),
    /// Accuracy summary across prompts
    Summary(SummaryArgs),
    /// Inspect the test set
    TestSet(TestSetArgs),
    /// Compare two completed runs
    Compare(CompareArgs),
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Prompt id to evaluate
    #[arg(long)]
    pub prompt: String,

    /// Compare against this run
    #[arg(long, conflicts_with = "baseline_prompt")]
    pub baseline_run: Option<String>,

    /// Compare against the latest completed run of this prompt
    #[arg(long)]
    pub baseline_prompt: Option<String>,

    /// Exit 1 when the comparison shows a regression
    #[arg(long)]
    pub fail_on_regression: bool,

    /// Regression threshold (absolute accuracy delta); overrides config
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Print the finished run as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub cmd: RunsSub,
}

#[derive(Subcommand, Debug)]
pub enum RunsSub {
    /// List runs, newest first
    List {
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one run with metrics and failed cases
    Show {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser, Debug)]
pub struct SummaryArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct TestSetArgs {
    #[command(subcommand)]
    pub cmd: TestSetSub,
}

#[derive(Subcommand, Debug)]
pub enum TestSetSub {
    /// Size and category distribution
    Info {
        #[arg(long)]
        json: bool,
    },
    /// List cases, optionally filtered by expected category
    Cases {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = promptlab_core::testset::DEFAULT_PAGE_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser, Debug)]
pub struct CompareArgs {
    pub baseline_run: String,
    pub current_run: String,

    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub fail_on_regression: bool,

    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "promptlab",
            "run",
            "--prompt",
            "v1",
            "--classifier",
            "fake",
            "--data-dir",
            "/tmp/x",
        ])
        .unwrap();
        assert_eq!(cli.global.classifier, ClassifierKind::Fake);
        assert_eq!(cli.global.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.cmd {
            Command::Run(args) => assert_eq!(args.prompt, "v1"),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_baseline_flags_conflict() {
        let res = Cli::try_parse_from([
            "promptlab",
            "run",
            "--prompt",
            "v2",
            "--baseline-run",
            "r1",
            "--baseline-prompt",
            "v1",
        ]);
        assert!(res.is_err());
    }
}
