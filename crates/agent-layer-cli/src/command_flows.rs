use std::io::IsTerminal;
use std::path::Path;

use agent_layer_core::{ConfigKeyMigration, PinAction, UpgradeChange, UpgradePlan};
use agent_layer_templates::{MigrationCatalog, TemplateSet};
use agent_layer_upgrade::{
    apply_upgrade_plan, build_upgrade_plan, ApplyOptions, ApplyReport, CategoryFlags,
    InteractivePrompter, PendingItem, PlanOptions, PlannedUpgrade, ProcessEnv, Prompter,
    RealFileSystem, RepoLayout, RollbackOutcome, SnapshotManager, StaticVersionResolver,
    SystemClock, UnifiedReviewPrompter, UpgradeContext, UpgradeSnapshot,
};
use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::render::{format_readiness_lines, render_status_line, OutputStyle, TerminalRenderer};
use crate::{ApplyArgs, PlanArgs, RollbackArgs, TargetArgs};

/// Everything an upgrade command reads, rooted at one repository.
pub(crate) struct UpgradeSession {
    layout: RepoLayout,
    fs: RealFileSystem,
    templates: TemplateSet,
    catalog: MigrationCatalog,
    versions: StaticVersionResolver,
    env: ProcessEnv,
}

impl UpgradeSession {
    pub(crate) fn open(repo_root: Option<&Path>) -> Result<Self> {
        let layout = match repo_root {
            Some(root) => {
                let root = root
                    .canonicalize()
                    .with_context(|| format!("repository root not found: {}", root.display()))?;
                if !root.is_dir() {
                    bail!("repository root is not a directory: {}", root.display());
                }
                RepoLayout::new(root)
            }
            None => {
                let cwd = std::env::current_dir().context("failed to read current directory")?;
                RepoLayout::discover(&cwd)?
            }
        };
        debug!(root = %layout.root().display(), "resolved repository root");

        Ok(Self {
            fs: RealFileSystem::new(layout.root()),
            layout,
            templates: TemplateSet::embedded(),
            catalog: MigrationCatalog::embedded()?,
            versions: StaticVersionResolver::for_binary(env!("CARGO_PKG_VERSION")),
            env: ProcessEnv,
        })
    }

    fn context(&self) -> UpgradeContext<'_> {
        UpgradeContext {
            layout: &self.layout,
            fs: &self.fs,
            templates: &self.templates,
            catalog: &self.catalog,
            versions: &self.versions,
            env: &self.env,
        }
    }
}

fn plan_options(target: &TargetArgs, dry_run: bool) -> PlanOptions {
    PlanOptions {
        version: target.version.clone().unwrap_or_default(),
        dry_run,
    }
}

pub(crate) fn run_upgrade_plan_command(
    renderer: TerminalRenderer,
    session: &UpgradeSession,
    args: &PlanArgs,
) -> Result<()> {
    let ctx = session.context();
    let planned = build_upgrade_plan(&ctx, &plan_options(&args.target, true))?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&planned.plan)
            .context("failed to serialize upgrade plan")?;
        println!("{rendered}");
        return Ok(());
    }

    let items = planned.pending_items(&ctx, args.target.diff_lines.unwrap_or_default())?;
    renderer.print_section("upgrade plan");
    renderer.print_lines(&format_plan_lines(renderer.style(), &planned.plan));

    let previews = format_preview_lines(&items);
    if !previews.is_empty() {
        renderer.print_section("diff previews");
        renderer.print_lines(&previews);
    }
    print_readiness(renderer, &planned);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CategorySelection {
    pub(crate) managed: bool,
    pub(crate) memory: bool,
    pub(crate) deletions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMode {
    /// `--yes` with category flags: everything selected applies unasked.
    AutoAccept(CategorySelection),
    /// Category flags on a terminal: selected deletions are still confirmed.
    ConfirmDeletions(CategorySelection),
    UnifiedReview,
    PerFile,
}

pub(crate) fn select_apply_mode(args: &ApplyArgs, interactive: bool) -> Result<ApplyMode> {
    if args.any_category() {
        let selection = CategorySelection {
            managed: args.apply_managed_updates,
            memory: args.apply_memory_updates,
            deletions: args.apply_deletions,
        };
        if args.yes {
            return Ok(ApplyMode::AutoAccept(selection));
        }
        if interactive {
            return Ok(ApplyMode::ConfirmDeletions(selection));
        }
        bail!("non-interactive upgrade requires --yes together with the --apply-* flags");
    }
    if args.yes {
        bail!(
            "--yes requires at least one of --apply-managed-updates, --apply-memory-updates or --apply-deletions"
        );
    }
    if !interactive {
        bail!(
            "al upgrade needs an interactive terminal; pass --yes with --apply-managed-updates, --apply-memory-updates or --apply-deletions to run without one"
        );
    }
    Ok(if args.per_file {
        ApplyMode::PerFile
    } else {
        ApplyMode::UnifiedReview
    })
}

pub(crate) fn run_upgrade_apply_command(
    renderer: TerminalRenderer,
    session: &UpgradeSession,
    args: &ApplyArgs,
) -> Result<()> {
    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    let mode = select_apply_mode(args, interactive)?;
    info!(?mode, "starting upgrade");

    let ctx = session.context();
    let planned = build_upgrade_plan(&ctx, &plan_options(&args.target, false))?;
    print_readiness(renderer, &planned);
    if !planned.plan.has_changes() {
        renderer.print_status("ok", "templates are already up to date");
        return Ok(());
    }

    let progress = renderer.apply_progress("upgrade");
    let options = ApplyOptions {
        diff_lines: args.target.diff_lines.unwrap_or_default(),
        cancel: None,
        observer: Some(&progress),
    };
    let stdin = std::io::stdin();
    let mut prompter: Box<dyn Prompter> = match mode {
        ApplyMode::AutoAccept(selection) => Box::new(CategoryFlags::new(
            selection.managed,
            selection.memory,
            selection.deletions,
        )),
        ApplyMode::ConfirmDeletions(selection) => Box::new(
            CategoryFlags::new(selection.managed, selection.memory, selection.deletions)
                .with_confirmation(InteractivePrompter::new(stdin.lock(), std::io::stdout())),
        ),
        ApplyMode::UnifiedReview => Box::new(UnifiedReviewPrompter::new(
            stdin.lock(),
            std::io::stdout(),
        )),
        ApplyMode::PerFile => Box::new(InteractivePrompter::new(stdin.lock(), std::io::stdout())),
    };

    let report = match apply_upgrade_plan(&ctx, &SystemClock, &planned, prompter.as_mut(), &options)
    {
        Ok(report) => report,
        Err(err) => {
            progress.abandon();
            return Err(err);
        }
    };

    if let Some(line) = progress.summary_line() {
        println!("{line}");
    }
    renderer.print_section("upgrade result");
    renderer.print_lines(&format_apply_report_lines(renderer.style(), &report));
    Ok(())
}

pub(crate) fn run_upgrade_rollback_command(
    renderer: TerminalRenderer,
    session: &UpgradeSession,
    args: &RollbackArgs,
) -> Result<()> {
    let clock = SystemClock;
    let manager = SnapshotManager::new(&session.fs, &session.layout, &clock);

    if args.list {
        let snapshots = manager.list_snapshots()?;
        if snapshots.is_empty() {
            renderer.print_status("step", "no upgrade snapshots recorded");
        } else {
            renderer.print_lines(&format_snapshot_lines(&snapshots));
        }
        return Ok(());
    }

    let Some(snapshot_id) = args.snapshot_id.as_deref() else {
        bail!("a snapshot id is required unless --list is given");
    };
    match manager.rollback(snapshot_id)? {
        RollbackOutcome::AlreadyRolledBack => renderer.print_status(
            "step",
            &format!("snapshot {snapshot_id} was already rolled back; no rollback needed"),
        ),
        RollbackOutcome::RolledBack { restored, removed } => renderer.print_status(
            "ok",
            &format!("rolled back {snapshot_id} (restored={restored} removed={removed})"),
        ),
    }
    Ok(())
}

fn print_readiness(renderer: TerminalRenderer, planned: &PlannedUpgrade) {
    let lines = format_readiness_lines(renderer.style(), &planned.plan.readiness_checks);
    if !lines.is_empty() {
        renderer.print_section("readiness");
        renderer.print_lines(&lines);
    }
}

fn ownership_suffix(change: &UpgradeChange) -> String {
    match change.ownership_state {
        Some(state) => format!(" [{}, {}]", state.as_str(), change.ownership.as_str()),
        None => format!(" [{}]", change.ownership.as_str()),
    }
}

fn push_changes(lines: &mut Vec<String>, title: &str, marker: &str, changes: &[UpgradeChange]) {
    if changes.is_empty() {
        return;
    }
    lines.push(format!("{title} ({}):", changes.len()));
    for change in changes {
        lines.push(format!("  {marker} {}{}", change.path, ownership_suffix(change)));
    }
}

fn config_value(value: Option<&serde_json::Value>) -> String {
    value.map_or_else(|| "(unset)".to_string(), ToString::to_string)
}

fn format_config_migration(migration: &ConfigKeyMigration) -> String {
    format!(
        "  {}: {} -> {}",
        migration.key,
        config_value(migration.from.as_ref()),
        config_value(migration.to.as_ref())
    )
}

pub(crate) fn format_plan_lines(style: OutputStyle, plan: &UpgradePlan) -> Vec<String> {
    let report = &plan.migration_report;
    let mut lines = vec![
        format!(
            "target version: {}",
            report.target_version.as_deref().unwrap_or("development build")
        ),
        match &report.source_version {
            Some(version) => format!(
                "source version: {version} ({})",
                report.source_version_origin.as_str()
            ),
            None => "source version: unknown".to_string(),
        },
    ];
    for note in &report.source_resolution_notes {
        lines.push(format!("  note: {note}"));
    }

    if !plan.has_changes() {
        lines.push(render_status_line(
            style,
            "ok",
            "templates are already up to date",
        ));
        return lines;
    }

    push_changes(&mut lines, "template additions", "+", &plan.template_additions);
    push_changes(&mut lines, "template updates", "~", &plan.template_updates);
    push_changes(
        &mut lines,
        "section-aware updates",
        "~",
        &plan.section_aware_updates,
    );
    if !plan.template_renames.is_empty() {
        lines.push(format!("template renames ({}):", plan.template_renames.len()));
        for rename in &plan.template_renames {
            lines.push(format!(
                "  > {} -> {} ({}, {}) [{}, {}]",
                rename.from,
                rename.to,
                rename.confidence.as_str(),
                rename.detection.as_str(),
                rename.ownership_state.as_str(),
                rename.ownership.as_str()
            ));
        }
    }
    push_changes(
        &mut lines,
        "removals or orphans",
        "-",
        &plan.template_removals_or_orphans,
    );
    if !plan.config_key_migrations.is_empty() {
        lines.push(format!(
            "config key migrations ({}):",
            plan.config_key_migrations.len()
        ));
        lines.extend(plan.config_key_migrations.iter().map(format_config_migration));
    }
    if !report.entries.is_empty() {
        lines.push(format!("migrations ({}):", report.entries.len()));
        for entry in &report.entries {
            let mut line = format!(
                "  {} {} {}",
                entry.id,
                entry.kind.as_str(),
                entry.status.as_str()
            );
            if let Some(reason) = &entry.skip_reason {
                line.push_str(&format!(" (reason={reason})"));
            }
            lines.push(line);
        }
    }
    let pin = &plan.pin_version_change;
    if pin.action != PinAction::None {
        lines.push(format!(
            "pin version: {} {} -> {}",
            pin.action.as_str(),
            pin.current.as_deref().unwrap_or("(none)"),
            pin.target.as_deref().unwrap_or("(none)")
        ));
    }
    lines
}

pub(crate) fn format_preview_lines(items: &[PendingItem]) -> Vec<String> {
    let mut lines = Vec::new();
    for item in items {
        let Some(preview) = &item.preview else {
            continue;
        };
        if preview.unified_diff.is_empty() {
            continue;
        }
        lines.push(item.describe());
        lines.extend(preview.unified_diff.lines().map(str::to_string));
    }
    lines
}

pub(crate) fn format_apply_report_lines(style: OutputStyle, report: &ApplyReport) -> Vec<String> {
    let mut lines = Vec::new();
    for item in &report.applied {
        lines.push(render_status_line(
            style,
            "ok",
            &format!("{} {}", item.action, item.path),
        ));
    }
    for item in &report.skipped {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "skipped {} {} (reason={})",
                item.action,
                item.path,
                item.reason.as_str()
            ),
        ));
    }
    if report.applied.is_empty() {
        lines.push(render_status_line(style, "step", "no changes applied"));
    }
    if let Some(snapshot_id) = &report.snapshot_id {
        lines.push(render_status_line(
            style,
            "step",
            &format!("snapshot={snapshot_id}; undo with `al upgrade rollback {snapshot_id}`"),
        ));
    }
    if !report.pruned_snapshots.is_empty() {
        lines.push(render_status_line(
            style,
            "step",
            &format!("pruned {} old snapshot(s)", report.pruned_snapshots.len()),
        ));
    }
    lines
}

pub(crate) fn format_snapshot_lines(snapshots: &[UpgradeSnapshot]) -> Vec<String> {
    snapshots
        .iter()
        .map(|snapshot| {
            let mut line = format!(
                "{} {} created={} files={}",
                snapshot.snapshot_id,
                snapshot.status.as_str(),
                snapshot.created_at_utc.format("%Y-%m-%dT%H:%M:%SZ"),
                snapshot.entries.len()
            );
            if let Some(rolled_back_at) = snapshot.rolled_back_at_utc {
                line.push_str(&format!(
                    " rolled_back={}",
                    rolled_back_at.format("%Y-%m-%dT%H:%M:%SZ")
                ));
            }
            line
        })
        .collect()
}
