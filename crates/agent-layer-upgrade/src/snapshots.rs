use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Clock, FileSystem, RepoLayout};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;
pub const SNAPSHOT_RETENTION: usize = 20;
const SNAPSHOT_ID_PREFIX: &str = "upgrade-";
const MAX_SNAPSHOT_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Applied,
    RolledBack,
}

impl SnapshotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::RolledBack => "rolled_back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    Utf8,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: String,
    pub existed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ContentEncoding>,
}

impl SnapshotEntry {
    fn capture(path: &str, content: Option<Vec<u8>>) -> Self {
        let Some(bytes) = content else {
            return Self {
                path: path.to_string(),
                existed: false,
                content: None,
                encoding: None,
            };
        };
        let (content, encoding) = match String::from_utf8(bytes) {
            Ok(text) => (text, ContentEncoding::Utf8),
            Err(err) => (BASE64.encode(err.into_bytes()), ContentEncoding::Base64),
        };
        Self {
            path: path.to_string(),
            existed: true,
            content: Some(content),
            encoding: Some(encoding),
        }
    }

    fn bytes(&self) -> Result<Vec<u8>> {
        let content = self
            .content
            .as_deref()
            .ok_or_else(|| anyhow!("snapshot entry '{}' has no content", self.path))?;
        match self.encoding.unwrap_or(ContentEncoding::Utf8) {
            ContentEncoding::Utf8 => Ok(content.as_bytes().to_vec()),
            ContentEncoding::Base64 => BASE64
                .decode(content)
                .with_context(|| format!("snapshot entry '{}' has invalid base64", self.path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSnapshot {
    pub schema_version: u32,
    pub snapshot_id: String,
    pub created_at_utc: DateTime<Utc>,
    pub status: SnapshotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_at_utc: Option<DateTime<Utc>>,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    AlreadyRolledBack,
    RolledBack { restored: usize, removed: usize },
}

pub fn validate_snapshot_id(snapshot_id: &str) -> Result<()> {
    let valid = !snapshot_id.is_empty()
        && snapshot_id.len() <= MAX_SNAPSHOT_ID_LEN
        && !snapshot_id.starts_with('.')
        && snapshot_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid snapshot id: {snapshot_id}"))
    }
}

pub struct SnapshotManager<'a> {
    fs: &'a dyn FileSystem,
    layout: &'a RepoLayout,
    clock: &'a dyn Clock,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(fs: &'a dyn FileSystem, layout: &'a RepoLayout, clock: &'a dyn Clock) -> Self {
        Self { fs, layout, clock }
    }

    fn next_snapshot_id(&self, created_at: DateTime<Utc>) -> Result<String> {
        let stamp = created_at.format("%Y%m%dT%H%M%SZ");
        for sequence in 1..=1000u32 {
            let candidate = format!("{SNAPSHOT_ID_PREFIX}{stamp}-{sequence}");
            if !self.fs.exists(&self.layout.snapshot_path(&candidate))? {
                return Ok(candidate);
            }
        }
        Err(anyhow!(
            "failed to allocate a snapshot id for {stamp}: too many snapshots in one second"
        ))
    }

    fn write(&self, snapshot: &UpgradeSnapshot) -> Result<String> {
        let path = self.layout.snapshot_path(&snapshot.snapshot_id);
        let mut content = serde_json::to_string_pretty(snapshot)
            .with_context(|| format!("failed serializing snapshot {}", snapshot.snapshot_id))?;
        content.push('\n');
        self.fs
            .write_durable(&path, content.as_bytes())
            .with_context(|| format!("failed writing snapshot {path}"))?;
        Ok(path)
    }

    /// Captures the current content (or absence) of every path and persists it
    /// durably before returning.
    pub fn create_snapshot(&self, paths: &[String]) -> Result<UpgradeSnapshot> {
        let created_at_utc = self.clock.now_utc();
        let snapshot_id = self.next_snapshot_id(created_at_utc)?;

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let content = self
                .fs
                .read(path)
                .with_context(|| format!("failed to capture {path} for snapshot"))?;
            entries.push(SnapshotEntry::capture(path, content));
        }

        let snapshot = UpgradeSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            snapshot_id,
            created_at_utc,
            status: SnapshotStatus::Applied,
            rolled_back_at_utc: None,
            entries,
        };
        let path = self.write(&snapshot)?;
        info!(
            snapshot = snapshot.snapshot_id.as_str(),
            entries = snapshot.entries.len(),
            path = path.as_str(),
            "created upgrade snapshot"
        );
        Ok(snapshot)
    }

    pub fn read_snapshot(&self, snapshot_id: &str) -> Result<Option<UpgradeSnapshot>> {
        validate_snapshot_id(snapshot_id)?;
        let path = self.layout.snapshot_path(snapshot_id);
        let Some(raw) = self
            .fs
            .read(&path)
            .with_context(|| format!("failed to read snapshot {path}"))?
        else {
            return Ok(None);
        };
        let snapshot: UpgradeSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("failed parsing snapshot {path}"))?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported snapshot schema_version {} in {path}",
                snapshot.schema_version
            ));
        }
        Ok(Some(snapshot))
    }

    pub fn list_snapshots(&self) -> Result<Vec<UpgradeSnapshot>> {
        let dir = self.layout.snapshots_dir();
        let files = self
            .fs
            .list_files(&dir)
            .with_context(|| format!("failed to list snapshots in {dir}"))?;

        let mut snapshots = Vec::new();
        for file in files {
            let Some(snapshot_id) = file
                .strip_prefix(&format!("{dir}/"))
                .and_then(|name| name.strip_suffix(".json"))
            else {
                continue;
            };
            if validate_snapshot_id(snapshot_id).is_err() {
                continue;
            }
            if let Some(snapshot) = self.read_snapshot(snapshot_id)? {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|left, right| {
            right
                .created_at_utc
                .cmp(&left.created_at_utc)
                .then_with(|| right.snapshot_id.cmp(&left.snapshot_id))
        });
        Ok(snapshots)
    }

    /// Restores every captured path exactly. Rolling back twice is a no-op.
    pub fn rollback(&self, snapshot_id: &str) -> Result<RollbackOutcome> {
        let mut snapshot = self
            .read_snapshot(snapshot_id)?
            .ok_or_else(|| anyhow!("snapshot not found: {snapshot_id}"))?;
        if snapshot.status == SnapshotStatus::RolledBack {
            info!(snapshot = snapshot_id, "snapshot already rolled back");
            return Ok(RollbackOutcome::AlreadyRolledBack);
        }

        let mut restored = 0;
        let mut removed = 0;
        for entry in &snapshot.entries {
            if entry.existed {
                self.fs
                    .write(&entry.path, &entry.bytes()?)
                    .with_context(|| format!("failed to restore {}", entry.path))?;
                restored += 1;
            } else if self
                .fs
                .remove(&entry.path)
                .with_context(|| format!("failed to remove {}", entry.path))?
            {
                removed += 1;
            }
        }

        snapshot.status = SnapshotStatus::RolledBack;
        snapshot.rolled_back_at_utc = Some(self.clock.now_utc());
        self.write(&snapshot)?;
        info!(snapshot = snapshot_id, restored, removed, "rolled back upgrade snapshot");
        Ok(RollbackOutcome::RolledBack { restored, removed })
    }

    pub fn prune_snapshots(&self, keep: usize) -> Result<Vec<String>> {
        let snapshots = self.list_snapshots()?;
        let mut pruned = Vec::new();
        for snapshot in snapshots.into_iter().skip(keep) {
            let path = self.layout.snapshot_path(&snapshot.snapshot_id);
            match self.fs.remove(&path) {
                Ok(_) => pruned.push(snapshot.snapshot_id),
                Err(err) => warn!(path = path.as_str(), error = %err, "failed to prune snapshot"),
            }
        }
        Ok(pruned)
    }
}
