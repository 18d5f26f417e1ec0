mod command_flows;
mod completion;
mod dispatch;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use agent_layer_upgrade::{parse_diff_lines, DiffLineLimit, VersionRequest};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::completion::CliCompletionShell;
use crate::dispatch::run_cli;

const LOG_ENV: &str = "AL_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser, Debug)]
#[command(name = "al")]
#[command(about = "Keeps agent-layer templates in a repository up to date", long_about = None)]
struct Cli {
    /// Repository root; defaults to the nearest parent containing `.agent-layer/`.
    #[arg(long, global = true, value_name = "PATH")]
    repo_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan, apply, or roll back a template upgrade.
    #[command(args_conflicts_with_subcommands = true)]
    Upgrade(UpgradeArgs),
    /// Print a shell completion script to stdout.
    Completions { shell: CliCompletionShell },
}

#[derive(Args, Debug)]
struct UpgradeArgs {
    #[command(subcommand)]
    command: Option<UpgradeCommand>,
    #[command(flatten)]
    apply: ApplyArgs,
}

#[derive(Subcommand, Debug)]
enum UpgradeCommand {
    /// Show what an upgrade would change without writing anything.
    Plan(PlanArgs),
    /// Restore the files captured by an upgrade snapshot.
    Rollback(RollbackArgs),
}

#[derive(Args, Debug, Default, Clone)]
struct ApplyArgs {
    /// Accept the selected categories without asking.
    #[arg(long)]
    yes: bool,
    #[arg(long)]
    apply_managed_updates: bool,
    #[arg(long)]
    apply_memory_updates: bool,
    #[arg(long)]
    apply_deletions: bool,
    /// Ask about each file instead of one question per category.
    #[arg(
        long,
        conflicts_with_all = ["yes", "apply_managed_updates", "apply_memory_updates", "apply_deletions"]
    )]
    per_file: bool,
    #[command(flatten)]
    target: TargetArgs,
}

impl ApplyArgs {
    fn any_category(&self) -> bool {
        self.apply_managed_updates || self.apply_memory_updates || self.apply_deletions
    }
}

#[derive(Args, Debug, Default, Clone)]
struct TargetArgs {
    /// Release to upgrade to: `X.Y.Z` or `latest`.
    #[arg(long, value_name = "VERSION", value_parser = parse_version_arg)]
    version: Option<VersionRequest>,
    /// Maximum diff lines shown per file.
    #[arg(long, value_name = "N", allow_hyphen_values = true, value_parser = parse_diff_lines_arg)]
    diff_lines: Option<DiffLineLimit>,
}

#[derive(Args, Debug, Clone)]
struct PlanArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Print the full plan as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct RollbackArgs {
    #[arg(value_name = "SNAPSHOT_ID", required_unless_present = "list", conflicts_with = "list")]
    snapshot_id: Option<String>,
    /// List snapshots, newest first.
    #[arg(long)]
    list: bool,
}

fn parse_version_arg(raw: &str) -> Result<VersionRequest, String> {
    raw.parse::<VersionRequest>()
        .map_err(|err| format!("{err:#}"))
}

fn parse_diff_lines_arg(raw: &str) -> Result<DiffLineLimit, String> {
    parse_diff_lines(raw).map_err(|err| err.to_string())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
