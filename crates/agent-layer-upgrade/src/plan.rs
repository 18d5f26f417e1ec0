use std::collections::BTreeSet;

use agent_layer_core::{UpgradePlan, UPGRADE_PLAN_SCHEMA_VERSION};
use agent_layer_templates::{MigrationCatalog, MigrationOperation, TemplateSet};
use anyhow::{Context, Result};
use semver::Version;
use tracing::info;

use crate::baseline::{read_baseline, ManagedBaseline};
use crate::config_keys::{parse_config, plan_config_key_migrations};
use crate::diff_planner::{plan_template_diff, read_installed_tree, InstalledTree};
use crate::migrations::{
    catalog_file_paths, evaluate_migrations, resolve_source_version, MigrationState,
};
use crate::pins::{plan_pin_version_change, read_pin};
use crate::readiness::{run_readiness_checks, EnvSource, ReadinessInputs};
use crate::renames::detect_renames;
use crate::version::{resolve_target_version, VersionRequest, VersionResolver};
use crate::{FileSystem, RepoLayout};

/// Collaborators the planner reads through. Nothing here is written to.
#[derive(Clone, Copy)]
pub struct UpgradeContext<'a> {
    pub layout: &'a RepoLayout,
    pub fs: &'a dyn FileSystem,
    pub templates: &'a TemplateSet,
    pub catalog: &'a MigrationCatalog,
    pub versions: &'a dyn VersionResolver,
    pub env: &'a dyn EnvSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub version: VersionRequest,
    pub dry_run: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            version: VersionRequest::Current,
            dry_run: true,
        }
    }
}

/// The plan plus the repository state it was computed from. The apply engine
/// acts on exactly this captured state.
#[derive(Debug, Clone)]
pub struct PlannedUpgrade {
    pub plan: UpgradePlan,
    pub(crate) installed: InstalledTree,
    pub(crate) baseline: Option<ManagedBaseline>,
    pub(crate) config_raw: Option<String>,
    pub(crate) pin: Option<String>,
    pub(crate) target: Option<Version>,
    pub(crate) migrations: Vec<MigrationOperation>,
}

impl PlannedUpgrade {
    pub fn target_version(&self) -> Option<&Version> {
        self.target.as_ref()
    }

    pub fn baseline(&self) -> Option<&ManagedBaseline> {
        self.baseline.as_ref()
    }
}

fn read_config(ctx: &UpgradeContext<'_>) -> Result<Option<(String, toml::Table)>> {
    let path = ctx.layout.config_path();
    let Some(raw) = ctx
        .fs
        .read(&path)
        .with_context(|| format!("failed to read {path}"))?
    else {
        return Ok(None);
    };
    let raw = String::from_utf8(raw).with_context(|| format!("{path} is not valid UTF-8"))?;
    let table = parse_config(&raw).with_context(|| format!("failed parsing {path}"))?;
    Ok(Some((raw, table)))
}

/// Builds the dry-run plan. Performs no writes.
pub fn build_upgrade_plan(ctx: &UpgradeContext<'_>, options: &PlanOptions) -> Result<PlannedUpgrade> {
    let target = resolve_target_version(ctx.versions, &options.version)?;
    let baseline = read_baseline(ctx.fs, ctx.layout)?;
    let pin = read_pin(ctx.fs, ctx.layout)?;
    let config = read_config(ctx)?;
    let (config_raw, config_table) = match config {
        Some((raw, table)) => (Some(raw), Some(table)),
        None => (None, None),
    };

    let migration_paths = catalog_file_paths(ctx.catalog);
    let installed = read_installed_tree(ctx.fs, ctx.templates, baseline.as_ref(), &migration_paths)?;
    let mut diff = plan_template_diff(ctx.templates, &installed, baseline.as_ref());

    let source = resolve_source_version(
        pin.as_deref(),
        baseline.is_some(),
        baseline
            .as_ref()
            .and_then(|baseline| baseline.baseline_version.as_deref()),
    );
    let existing_files = migration_paths
        .iter()
        .filter(|path| installed.contains(path))
        .cloned()
        .collect();
    let outcome = evaluate_migrations(
        ctx.catalog,
        target.as_ref(),
        &source,
        MigrationState {
            existing_files,
            config: config_table.clone(),
        },
    );
    let config_key_migrations = plan_config_key_migrations(config_table.as_ref(), &outcome.planned);

    let touched_by_migrations: BTreeSet<&str> = outcome
        .planned
        .iter()
        .filter(|operation| operation.kind.touches_files())
        .flat_map(|operation| operation.from.iter().chain(operation.to.iter()))
        .map(String::as_str)
        .collect();
    diff.additions
        .retain(|change| !touched_by_migrations.contains(change.path.as_str()));
    diff.removals_or_orphans
        .retain(|change| !touched_by_migrations.contains(change.path.as_str()));

    let renames = detect_renames(
        &diff.removals_or_orphans,
        &diff.additions,
        ctx.templates,
        &installed,
    );
    let renamed: BTreeSet<&str> = renames
        .iter()
        .flat_map(|rename| [rename.from.as_str(), rename.to.as_str()])
        .collect();
    diff.additions
        .retain(|change| !renamed.contains(change.path.as_str()));
    diff.removals_or_orphans
        .retain(|change| !renamed.contains(change.path.as_str()));

    let pin_version_change = plan_pin_version_change(pin.as_deref(), target.as_ref());
    let readiness_checks = run_readiness_checks(&ReadinessInputs {
        fs: ctx.fs,
        layout: ctx.layout,
        config: outcome.projected_config.as_ref(),
        env: ctx.env,
    });

    let plan = UpgradePlan {
        schema_version: UPGRADE_PLAN_SCHEMA_VERSION,
        dry_run: options.dry_run,
        template_additions: diff.additions,
        template_updates: diff.updates,
        section_aware_updates: diff.section_aware_updates,
        template_renames: renames,
        template_removals_or_orphans: diff.removals_or_orphans,
        config_key_migrations,
        migration_report: outcome.report,
        pin_version_change,
        readiness_checks,
    };
    info!(
        additions = plan.template_additions.len(),
        updates = plan.template_updates.len(),
        section_aware = plan.section_aware_updates.len(),
        renames = plan.template_renames.len(),
        removals = plan.template_removals_or_orphans.len(),
        config_keys = plan.config_key_migrations.len(),
        readiness = plan.readiness_checks.len(),
        "built upgrade plan"
    );

    Ok(PlannedUpgrade {
        plan,
        installed,
        baseline,
        config_raw,
        pin,
        target,
        migrations: outcome.planned,
    })
}
