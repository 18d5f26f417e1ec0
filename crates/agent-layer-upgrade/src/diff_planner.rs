use std::collections::{BTreeMap, BTreeSet};

use agent_layer_core::{
    fingerprint_content, has_entries_marker, managed_region, OwnershipReason, UpgradeChange,
};
use agent_layer_templates::{TemplateSet, MANAGED_DIRS};
use anyhow::{Context, Result};
use tracing::debug;

use crate::baseline::ManagedBaseline;
use crate::ownership::{addition, change_from_verdict, classify_ownership, ClassifyInput};
use crate::FileSystem;

/// Content of every path the planner looks at, captured once before planning.
/// Absent paths are simply missing from the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl InstalledTree {
    pub fn from_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: AsRef<[u8]>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, content)| (path.into(), content.as_ref().to_vec()))
                .collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn get_text(&self, path: &str) -> Option<String> {
        self.get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

/// Reads the templates' paths, the baseline's paths, everything under the
/// managed directories and any `extra_paths`.
pub fn read_installed_tree(
    fs: &dyn FileSystem,
    templates: &TemplateSet,
    baseline: Option<&ManagedBaseline>,
    extra_paths: &[String],
) -> Result<InstalledTree> {
    let mut candidates: BTreeSet<String> = templates.paths().map(str::to_string).collect();
    if let Some(baseline) = baseline {
        candidates.extend(baseline.paths().map(str::to_string));
    }
    for dir in MANAGED_DIRS {
        let listed = fs
            .list_files(dir)
            .with_context(|| format!("failed to list managed directory {dir}"))?;
        candidates.extend(listed);
    }
    candidates.extend(extra_paths.iter().cloned());

    let mut files = BTreeMap::new();
    for path in candidates {
        if let Some(content) = fs
            .read(&path)
            .with_context(|| format!("failed to read installed file {path}"))?
        {
            files.insert(path, content);
        }
    }
    debug!(files = files.len(), "read installed tree");
    Ok(InstalledTree { files })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDiff {
    pub additions: Vec<UpgradeChange>,
    pub updates: Vec<UpgradeChange>,
    pub section_aware_updates: Vec<UpgradeChange>,
    pub removals_or_orphans: Vec<UpgradeChange>,
}

fn same_content(left: &[u8], right: &[u8]) -> bool {
    fingerprint_content(left) == fingerprint_content(right)
}

pub fn plan_template_diff(
    templates: &TemplateSet,
    installed: &InstalledTree,
    baseline: Option<&ManagedBaseline>,
) -> TemplateDiff {
    let mut paths: BTreeSet<&str> = templates.paths().collect();
    paths.extend(
        installed
            .paths()
            .filter(|path| agent_layer_templates::is_in_managed_dir(path)),
    );
    if let Some(baseline) = baseline {
        paths.extend(baseline.paths());
    }

    let mut diff = TemplateDiff::default();
    for path in paths {
        let installed_content = installed.get(path);
        let baseline_entry = baseline.and_then(|baseline| baseline.entry(path));
        let input = ClassifyInput {
            path,
            installed: installed_content,
            baseline: baseline_entry,
        };

        let Some(template) = templates.get(path) else {
            if installed_content.is_none() {
                continue;
            }
            if let Some(verdict) = classify_ownership(input) {
                let verdict = verdict.with_reason(OwnershipReason::NotShippedByTemplates);
                diff.removals_or_orphans
                    .push(change_from_verdict(path, verdict));
            }
            continue;
        };

        let Some(installed_content) = installed_content else {
            match classify_ownership(input) {
                Some(verdict) => diff
                    .removals_or_orphans
                    .push(change_from_verdict(path, verdict)),
                None => diff.additions.push(addition(path)),
            }
            continue;
        };

        if has_entries_marker(template) {
            let installed_text = String::from_utf8_lossy(installed_content);
            let marker_missing = match (managed_region(template), managed_region(&installed_text)) {
                (Some(expected), Some(actual)) => {
                    if same_content(expected.as_bytes(), actual.as_bytes()) {
                        continue;
                    }
                    false
                }
                _ => true,
            };
            if let Some(mut verdict) = classify_ownership(input) {
                if marker_missing {
                    verdict = verdict.with_reason(OwnershipReason::ManagedMarkerMissing);
                }
                diff.section_aware_updates
                    .push(change_from_verdict(path, verdict));
            }
            continue;
        }

        if same_content(template.as_bytes(), installed_content) {
            continue;
        }
        if let Some(verdict) = classify_ownership(input) {
            diff.updates.push(change_from_verdict(path, verdict));
        }
    }

    debug!(
        additions = diff.additions.len(),
        updates = diff.updates.len(),
        section_aware = diff.section_aware_updates.len(),
        removals = diff.removals_or_orphans.len(),
        "planned template diff"
    );
    diff
}
