use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agent_layer_core::{
    has_entries_marker, merge_managed_section, DiffPreview, MigrationKind, Ownership,
    OwnershipState, PinAction,
};
use agent_layer_templates::{file_category, FileCategory};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::baseline::{
    fingerprint_for_policy, policy_for_template, write_baseline, BaselineEntry, BaselineSource,
    ManagedBaseline,
};
use crate::config_keys::{apply_config_edits, ConfigEdit};
use crate::plan::{PlannedUpgrade, UpgradeContext};
use crate::preview::{render_diff_preview, DiffLineLimit};
use crate::prompter::{Decision, Prompter, ReviewBatch, ReviewOutcome};
use crate::snapshots::{SnapshotManager, SNAPSHOT_RETENTION};
use crate::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Managed,
    Memory,
    Deletion,
}

impl ChangeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Memory => "memory",
            Self::Deletion => "deletion",
        }
    }

    fn for_path(path: &str) -> Self {
        match file_category(path) {
            FileCategory::Managed => Self::Managed,
            FileCategory::Memory => Self::Memory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    Addition,
    Update,
    SectionAwareUpdate,
    Rename { from: String },
    Removal,
    Migration { id: String, kind: MigrationKind },
    PinChange(PinAction),
}

impl PendingKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Update => "update",
            Self::SectionAwareUpdate => "section-aware update",
            Self::Rename { .. } => "rename",
            Self::Removal => "removal",
            Self::Migration { kind, .. } => kind.as_str(),
            Self::PinChange(_) => "pin version change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mutation {
    pub(crate) path: String,
    pub(crate) content: Option<Vec<u8>>,
}

impl Mutation {
    fn write(path: &str, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            content: Some(content.into()),
        }
    }

    fn remove(path: &str) -> Self {
        Self {
            path: path.to_string(),
            content: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingItem {
    pub path: String,
    pub category: ChangeCategory,
    pub kind: PendingKind,
    pub ownership: Option<Ownership>,
    pub ownership_state: Option<OwnershipState>,
    pub preview: Option<DiffPreview>,
    effects: Vec<Mutation>,
    config_edit: Option<ConfigEdit>,
}

impl PendingItem {
    fn new(path: &str, category: ChangeCategory, kind: PendingKind) -> Self {
        Self {
            path: path.to_string(),
            category,
            kind,
            ownership: None,
            ownership_state: None,
            preview: None,
            effects: Vec::new(),
            config_edit: None,
        }
    }

    pub fn requires_explicit_accept(&self) -> bool {
        self.ownership
            .is_some_and(Ownership::requires_explicit_accept)
    }

    pub fn describe(&self) -> String {
        let subject = match &self.kind {
            PendingKind::Rename { from } => format!("{from} -> {}", self.path),
            PendingKind::Migration { id, .. } => format!("{} ({id})", self.path),
            _ => self.path.clone(),
        };
        let mut line = format!("{} {subject}", self.kind.label());
        if let (Some(state), Some(ownership)) = (self.ownership_state, self.ownership) {
            line.push_str(&format!(
                " [{}, {}]",
                state.as_str(),
                ownership.as_str()
            ));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ManagedNotRequested,
    MemoryCategory,
    DeletionsNotRequested,
    Declined,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManagedNotRequested => "managed updates not requested",
            Self::MemoryCategory => "memory category",
            Self::DeletionsNotRequested => "deletions not requested",
            Self::Declined => "declined",
        }
    }

    fn for_category(category: ChangeCategory) -> Self {
        match category {
            ChangeCategory::Managed => Self::ManagedNotRequested,
            ChangeCategory::Memory => Self::MemoryCategory,
            ChangeCategory::Deletion => Self::DeletionsNotRequested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedItem {
    pub path: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub path: String,
    pub action: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub snapshot_id: Option<String>,
    pub applied: Vec<AppliedItem>,
    pub skipped: Vec<SkippedItem>,
    pub baseline_written: bool,
    pub pruned_snapshots: Vec<String>,
}

pub trait ApplyObserver {
    fn on_start(&self, _total: usize) {}
    fn on_write(&self, _path: &str) {}
    fn on_finish(&self) {}
}

#[derive(Default)]
pub struct ApplyOptions<'a> {
    pub diff_lines: DiffLineLimit,
    pub cancel: Option<Arc<AtomicBool>>,
    pub observer: Option<&'a dyn ApplyObserver>,
}

impl ApplyOptions<'_> {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl PlannedUpgrade {
    fn staged_content(
        &self,
        staged: &BTreeMap<String, Option<Vec<u8>>>,
        path: &str,
    ) -> Option<Vec<u8>> {
        match staged.get(path) {
            Some(content) => content.clone(),
            None => self.installed.get(path).map(<[u8]>::to_vec),
        }
    }

    pub fn pending_items(
        &self,
        ctx: &UpgradeContext<'_>,
        limit: DiffLineLimit,
    ) -> Result<Vec<PendingItem>> {
        let plan = &self.plan;
        let mut items = Vec::new();

        let template = |path: &str| {
            ctx.templates
                .get(path)
                .ok_or_else(|| anyhow!("template not found for planned path {path}"))
        };

        for change in &plan.template_additions {
            let content = template(&change.path)?;
            // Creating a missing file never touches user content.
            let mut item =
                PendingItem::new(&change.path, ChangeCategory::Managed, PendingKind::Addition);
            item.ownership = Some(change.ownership);
            item.preview = Some(render_diff_preview(&change.path, "", content, limit));
            item.effects.push(Mutation::write(&change.path, content));
            items.push(item);
        }

        for (changes, kind) in [
            (&plan.template_updates, PendingKind::Update),
            (&plan.section_aware_updates, PendingKind::SectionAwareUpdate),
        ] {
            for change in changes {
                let content = template(&change.path)?;
                let installed = self.installed.get_text(&change.path).unwrap_or_default();
                let next = match kind {
                    PendingKind::SectionAwareUpdate => merge_managed_section(content, &installed),
                    _ => content.to_string(),
                };
                let mut item = PendingItem::new(
                    &change.path,
                    ChangeCategory::for_path(&change.path),
                    kind.clone(),
                );
                item.ownership = Some(change.ownership);
                item.ownership_state = change.ownership_state;
                item.preview = Some(render_diff_preview(&change.path, &installed, &next, limit));
                item.effects.push(Mutation::write(&change.path, next));
                items.push(item);
            }
        }

        for rename in &plan.template_renames {
            let content = template(&rename.to)?;
            let installed = self.installed.get_text(&rename.from).unwrap_or_default();
            // Entries below the marker move with the file.
            let next = if has_entries_marker(content) {
                merge_managed_section(content, &installed)
            } else {
                content.to_string()
            };
            let mut item = PendingItem::new(
                &rename.to,
                ChangeCategory::for_path(&rename.to),
                PendingKind::Rename {
                    from: rename.from.clone(),
                },
            );
            item.ownership = Some(rename.ownership);
            item.ownership_state = Some(rename.ownership_state);
            item.preview = Some(render_diff_preview(&rename.to, &installed, &next, limit));
            item.effects.push(Mutation::write(&rename.to, next));
            item.effects.push(Mutation::remove(&rename.from));
            items.push(item);
        }

        for change in &plan.template_removals_or_orphans {
            let Some(installed) = self.installed.get_text(&change.path) else {
                continue;
            };
            let mut item =
                PendingItem::new(&change.path, ChangeCategory::Deletion, PendingKind::Removal);
            item.ownership = Some(change.ownership);
            item.ownership_state = change.ownership_state;
            item.preview = Some(render_diff_preview(&change.path, &installed, "", limit));
            item.effects.push(Mutation::remove(&change.path));
            items.push(item);
        }

        let mut staged: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();
        let mut config_items = Vec::new();
        for operation in &self.migrations {
            let kind = PendingKind::Migration {
                id: operation.id.clone(),
                kind: operation.kind,
            };
            match operation.kind {
                MigrationKind::RenameFile => {
                    let from = operation.from.as_deref().unwrap_or_default();
                    let to = operation.to.as_deref().unwrap_or_default();
                    let content = self.staged_content(&staged, from).ok_or_else(|| {
                        anyhow!("migration '{}' source {from} is not present", operation.id)
                    })?;
                    let mut item = PendingItem::new(to, ChangeCategory::Managed, kind);
                    item.effects.push(Mutation::write(to, content.clone()));
                    item.effects.push(Mutation::remove(from));
                    staged.insert(to.to_string(), Some(content));
                    staged.insert(from.to_string(), None);
                    items.push(item);
                }
                MigrationKind::DeleteFile | MigrationKind::DeleteGeneratedArtifact => {
                    let from = operation.from.as_deref().unwrap_or_default();
                    let mut item = PendingItem::new(from, ChangeCategory::Deletion, kind);
                    if let Some(content) = self.staged_content(&staged, from) {
                        item.preview = Some(render_diff_preview(from, &text(&content), "", limit));
                    }
                    item.effects.push(Mutation::remove(from));
                    staged.insert(from.to_string(), None);
                    items.push(item);
                }
                MigrationKind::ConfigRenameKey
                | MigrationKind::ConfigSetDefault
                | MigrationKind::ConfigRetypeKey => {
                    let Some(edit) = ConfigEdit::from_operation(operation) else {
                        continue;
                    };
                    let config_path = ctx.layout.config_path();
                    let mut item = PendingItem::new(&config_path, ChangeCategory::Managed, kind);
                    if let Some(raw) = &self.config_raw {
                        let after = apply_config_edits(raw, std::slice::from_ref(&edit))?;
                        item.preview = Some(render_diff_preview(&config_path, raw, &after, limit));
                    }
                    item.config_edit = Some(edit);
                    config_items.push(item);
                }
            }
        }
        items.extend(config_items);

        let pin = &plan.pin_version_change;
        let pin_path = ctx.layout.pin_path();
        let current = self.pin.as_deref().map(|pin| format!("{pin}\n")).unwrap_or_default();
        let pin_effect = match (pin.action, pin.target.as_deref()) {
            (PinAction::Add | PinAction::Update, Some(target)) => {
                Some((format!("{target}\n"), Mutation::write(&pin_path, format!("{target}\n"))))
            }
            (PinAction::Remove, _) => Some((String::new(), Mutation::remove(&pin_path))),
            _ => None,
        };
        if let Some((next, effect)) = pin_effect {
            let mut item =
                PendingItem::new(&pin_path, ChangeCategory::Managed, PendingKind::PinChange(pin.action));
            item.preview = Some(render_diff_preview(&pin_path, &current, &next, limit));
            item.effects.push(effect);
            items.push(item);
        }

        Ok(items)
    }
}

fn decide_all(
    items: &[PendingItem],
    prompter: &mut dyn Prompter,
) -> Result<Vec<Decision>> {
    let batch = ReviewBatch {
        managed: items
            .iter()
            .filter(|item| item.category == ChangeCategory::Managed)
            .collect(),
        memory: items
            .iter()
            .filter(|item| item.category == ChangeCategory::Memory)
            .collect(),
    };
    let outcome = prompter.review(&batch)?;

    let mut decisions = Vec::with_capacity(items.len());
    for item in items {
        let decision = match (item.category, outcome) {
            (ChangeCategory::Managed, ReviewOutcome::Categories { managed, .. }) => managed,
            (ChangeCategory::Memory, ReviewOutcome::Categories { memory, .. }) => memory,
            _ => prompter.decide(item)?,
        };
        debug!(
            path = item.path.as_str(),
            action = item.kind.label(),
            apply = decision == Decision::Apply,
            "apply decision"
        );
        decisions.push(decision);
    }
    Ok(decisions)
}

fn upsert(mutations: &mut Vec<Mutation>, mutation: Mutation) {
    match mutations.iter_mut().find(|existing| existing.path == mutation.path) {
        Some(existing) => existing.content = mutation.content,
        None => mutations.push(mutation),
    }
}

/// Baseline after the apply. Shipped templates whose installed content now
/// matches are recorded and entries for vanished unshipped files go away.
/// The recorded version only moves to the target when nothing was skipped.
fn next_baseline(
    ctx: &UpgradeContext<'_>,
    planned: &PlannedUpgrade,
    after: &BTreeMap<String, Option<Vec<u8>>>,
    fully_applied: bool,
    clock: &dyn Clock,
) -> ManagedBaseline {
    let now = clock.now_utc();
    let previous = planned.baseline.as_ref();
    let mut entries: BTreeMap<String, BaselineEntry> =
        previous.map(ManagedBaseline::entry_map).unwrap_or_default();

    let current = |path: &str| -> Option<Vec<u8>> {
        match after.get(path) {
            Some(content) => content.clone(),
            None => planned.installed.get(path).map(<[u8]>::to_vec),
        }
    };

    for template in ctx.templates.iter() {
        let Some(installed) = current(template.path) else {
            continue;
        };
        let policy = policy_for_template(template.content);
        let expected = fingerprint_for_policy(template.content.as_bytes(), policy);
        if fingerprint_for_policy(&installed, policy) == expected {
            entries.insert(
                template.path.to_string(),
                BaselineEntry {
                    path: template.path.to_string(),
                    fingerprint: expected,
                    policy,
                },
            );
        }
    }
    entries.retain(|path, _| ctx.templates.contains(path) || current(path).is_some());

    let target = planned.target.as_ref().map(ToString::to_string);
    let previous_version = previous.and_then(|baseline| baseline.baseline_version.clone());
    let baseline_version = match target {
        Some(target) if fully_applied => Some(target),
        _ => previous_version,
    };

    ManagedBaseline {
        schema_version: crate::BASELINE_SCHEMA_VERSION,
        baseline_version,
        source: BaselineSource::WrittenByUpgrade,
        created_at_utc: previous.map(|baseline| baseline.created_at_utc).unwrap_or(now),
        updated_at_utc: now,
        files: entries.into_values().collect(),
    }
}

fn same_baseline(left: &ManagedBaseline, right: Option<&ManagedBaseline>) -> bool {
    let Some(right) = right else {
        return false;
    };
    let paths = |baseline: &ManagedBaseline| {
        baseline
            .files
            .iter()
            .map(|entry| (entry.path.clone(), entry.fingerprint.clone(), entry.policy))
            .collect::<BTreeSet<_>>()
    };
    left.baseline_version == right.baseline_version && paths(left) == paths(right)
}

fn rollback_hint(snapshot_id: &str) -> String {
    format!("snapshot={snapshot_id}; run `al upgrade rollback {snapshot_id}` to restore the previous state")
}

/// Applies the accepted subset of `planned`. Every write happens after a
/// snapshot of all paths about to change; the baseline is written last.
pub fn apply_upgrade_plan(
    ctx: &UpgradeContext<'_>,
    clock: &dyn Clock,
    planned: &PlannedUpgrade,
    prompter: &mut dyn Prompter,
    options: &ApplyOptions<'_>,
) -> Result<ApplyReport> {
    let items = planned.pending_items(ctx, options.diff_lines)?;
    let decisions = decide_all(&items, prompter)?;

    let mut report = ApplyReport::default();
    let mut mutations: Vec<Mutation> = Vec::new();
    let mut config_slot = None;
    let mut config_edits = Vec::new();
    let mut applied_migrations = BTreeSet::new();

    for (item, decision) in items.iter().zip(&decisions) {
        if *decision != Decision::Apply {
            let reason = if *decision == Decision::Decline {
                SkipReason::Declined
            } else {
                SkipReason::for_category(item.category)
            };
            report.skipped.push(SkippedItem {
                path: item.path.clone(),
                action: item.kind.label().to_string(),
                reason,
            });
            continue;
        }
        report.applied.push(AppliedItem {
            path: item.path.clone(),
            action: item.kind.label().to_string(),
        });
        if let PendingKind::Migration { id, .. } = &item.kind {
            applied_migrations.insert(id.as_str());
        }
        if let Some(edit) = &item.config_edit {
            config_edits.push(edit.clone());
            if config_slot.is_none() {
                config_slot = Some(mutations.len());
                mutations.push(Mutation::remove(&ctx.layout.config_path()));
            }
            continue;
        }
        for effect in &item.effects {
            upsert(&mut mutations, effect.clone());
        }
    }

    if let Some(slot) = config_slot {
        let raw = planned
            .config_raw
            .as_deref()
            .ok_or_else(|| anyhow!("config migrations planned without a config file"))?;
        mutations[slot].content = Some(apply_config_edits(raw, &config_edits)?.into_bytes());
    }

    let mut effective = Vec::with_capacity(mutations.len());
    for mutation in mutations {
        let current = ctx
            .fs
            .read(&mutation.path)
            .with_context(|| format!("failed to read {}", mutation.path))?;
        if current != mutation.content {
            effective.push(mutation);
        }
    }

    let after: BTreeMap<String, Option<Vec<u8>>> = effective
        .iter()
        .map(|mutation| (mutation.path.clone(), mutation.content.clone()))
        .collect();
    let fully_applied = report.skipped.is_empty()
        && planned
            .migrations
            .iter()
            .all(|operation| applied_migrations.contains(operation.id.as_str()));
    let baseline = next_baseline(ctx, planned, &after, fully_applied, clock);
    let baseline_changed = !same_baseline(&baseline, planned.baseline.as_ref())
        && !(planned.baseline.is_none() && baseline.files.is_empty());

    if effective.is_empty() && !baseline_changed {
        info!("nothing to apply");
        return Ok(report);
    }

    if options.cancelled() {
        bail!("upgrade cancelled before any changes were made");
    }

    let baseline_path = ctx.layout.baseline_path();
    let mut snapshot_paths: Vec<String> = effective
        .iter()
        .map(|mutation| mutation.path.clone())
        .collect();
    snapshot_paths.push(baseline_path.clone());

    let manager = SnapshotManager::new(ctx.fs, ctx.layout, clock);
    let snapshot = manager
        .create_snapshot(&snapshot_paths)
        .context("failed to create upgrade snapshot; no files were changed")?;
    let snapshot_id = snapshot.snapshot_id;
    report.snapshot_id = Some(snapshot_id.clone());

    if let Some(observer) = options.observer {
        observer.on_start(effective.len() + 1);
    }
    for mutation in &effective {
        if options.cancelled() {
            bail!("upgrade cancelled: {}", rollback_hint(&snapshot_id));
        }
        let result = match &mutation.content {
            Some(content) => ctx.fs.write(&mutation.path, content),
            None => ctx.fs.remove(&mutation.path).map(|_| ()),
        };
        result.with_context(|| {
            format!(
                "upgrade apply failed writing {}: {}",
                mutation.path,
                rollback_hint(&snapshot_id)
            )
        })?;
        debug!(path = mutation.path.as_str(), removed = mutation.content.is_none(), "applied write");
        if let Some(observer) = options.observer {
            observer.on_write(&mutation.path);
        }
    }

    if options.cancelled() {
        bail!("upgrade cancelled: {}", rollback_hint(&snapshot_id));
    }
    write_baseline(ctx.fs, ctx.layout, &baseline).with_context(|| {
        format!("upgrade apply failed writing the baseline: {}", rollback_hint(&snapshot_id))
    })?;
    report.baseline_written = true;
    if let Some(observer) = options.observer {
        observer.on_write(&baseline_path);
        observer.on_finish();
    }

    match manager.prune_snapshots(SNAPSHOT_RETENTION) {
        Ok(pruned) => report.pruned_snapshots = pruned,
        Err(err) => warn!(error = %err, "failed to prune old snapshots"),
    }

    info!(
        snapshot = snapshot_id.as_str(),
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "applied upgrade"
    );
    Ok(report)
}
