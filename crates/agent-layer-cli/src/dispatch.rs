use anyhow::Result;

use crate::command_flows::{
    run_upgrade_apply_command, run_upgrade_plan_command, run_upgrade_rollback_command,
    UpgradeSession,
};
use crate::completion::write_completions_script;
use crate::render::TerminalRenderer;
use crate::{Cli, Commands, UpgradeCommand};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::current();

    match cli.command {
        Commands::Upgrade(args) => {
            let session = UpgradeSession::open(cli.repo_root.as_deref())?;
            match args.command {
                Some(UpgradeCommand::Plan(plan)) => {
                    run_upgrade_plan_command(renderer, &session, &plan)
                }
                Some(UpgradeCommand::Rollback(rollback)) => {
                    run_upgrade_rollback_command(renderer, &session, &rollback)
                }
                None => run_upgrade_apply_command(renderer, &session, &args.apply),
            }
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)
        }
    }
}
