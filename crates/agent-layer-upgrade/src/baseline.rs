use std::collections::{BTreeMap, BTreeSet};

use agent_layer_core::{fingerprint_content, has_entries_marker, managed_region, Fingerprint};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FileSystem, RepoLayout};

pub const BASELINE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    WrittenByUpgrade,
    WrittenByInit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    Full,
    ManagedSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub path: String,
    pub fingerprint: Fingerprint,
    pub policy: BaselinePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedBaseline {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_version: Option<String>,
    pub source: BaselineSource,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<BaselineEntry>,
}

impl ManagedBaseline {
    pub fn new(source: BaselineSource, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: BASELINE_SCHEMA_VERSION,
            baseline_version: None,
            source,
            created_at_utc: now,
            updated_at_utc: now,
            files: Vec::new(),
        }
    }

    pub fn entry(&self, path: &str) -> Option<&BaselineEntry> {
        self.files.iter().find(|entry| entry.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|entry| entry.path.as_str())
    }

    pub(crate) fn entry_map(&self) -> BTreeMap<String, BaselineEntry> {
        self.files
            .iter()
            .map(|entry| (entry.path.clone(), entry.clone()))
            .collect()
    }
}

pub fn policy_for_template(template: &str) -> BaselinePolicy {
    if has_entries_marker(template) {
        BaselinePolicy::ManagedSection
    } else {
        BaselinePolicy::Full
    }
}

/// A file without the marker is fingerprinted whole, so it never matches a
/// managed-section baseline.
pub fn fingerprint_for_policy(content: &[u8], policy: BaselinePolicy) -> Fingerprint {
    match policy {
        BaselinePolicy::Full => fingerprint_content(content),
        BaselinePolicy::ManagedSection => {
            let text = String::from_utf8_lossy(content);
            match managed_region(&text) {
                Some(region) => fingerprint_content(region.as_bytes()),
                None => fingerprint_content(content),
            }
        }
    }
}

pub fn read_baseline(fs: &dyn FileSystem, layout: &RepoLayout) -> Result<Option<ManagedBaseline>> {
    let path = layout.baseline_path();
    let Some(raw) = fs
        .read(&path)
        .with_context(|| format!("baseline-unreadable: failed to read {path}"))?
    else {
        return Ok(None);
    };

    let baseline: ManagedBaseline = serde_json::from_slice(&raw)
        .with_context(|| format!("baseline-corrupt: failed to parse {path}"))?;
    if baseline.schema_version != BASELINE_SCHEMA_VERSION {
        return Err(anyhow!(
            "baseline-corrupt: unsupported schema_version {} in {path}",
            baseline.schema_version
        ));
    }

    let mut seen = BTreeSet::new();
    for entry in &baseline.files {
        if !seen.insert(entry.path.as_str()) {
            return Err(anyhow!(
                "baseline-corrupt: duplicate entry '{}' in {path}",
                entry.path
            ));
        }
    }
    Ok(Some(baseline))
}

pub fn serialize_baseline(baseline: &ManagedBaseline) -> Result<Vec<u8>> {
    let mut sorted = baseline.clone();
    sorted
        .files
        .sort_by(|left, right| left.path.cmp(&right.path));
    let mut content =
        serde_json::to_string_pretty(&sorted).context("failed to serialize managed baseline")?;
    content.push('\n');
    Ok(content.into_bytes())
}

pub fn write_baseline(
    fs: &dyn FileSystem,
    layout: &RepoLayout,
    baseline: &ManagedBaseline,
) -> Result<String> {
    let path = layout.baseline_path();
    let content = serialize_baseline(baseline)?;
    fs.write_durable(&path, &content)
        .with_context(|| format!("failed to write baseline: {path}"))?;
    Ok(path)
}
