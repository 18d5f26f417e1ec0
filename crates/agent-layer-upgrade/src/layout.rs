use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use agent_layer_templates::AGENT_LAYER_DIR;

/// Every persisted path the upgrade engine touches, relative to the repository
/// root and `/`-separated so it can be handed to a [`crate::FileSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walks up from `start` to the first directory that contains `.agent-layer/`.
    pub fn discover(start: &Path) -> Result<Self> {
        let start = start
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", start.display()))?;
        for candidate in start.ancestors() {
            if candidate.join(AGENT_LAYER_DIR).is_dir() {
                return Ok(Self::new(candidate));
            }
        }
        bail!(
            "no {AGENT_LAYER_DIR}/ directory found in {} or any parent; run from inside an agent-layer repository or pass --repo-root",
            start.display()
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> String {
        format!("{AGENT_LAYER_DIR}/state")
    }

    pub fn baseline_path(&self) -> String {
        format!("{}/managed-baseline.json", self.state_dir())
    }

    pub fn snapshots_dir(&self) -> String {
        format!("{}/upgrade-snapshots", self.state_dir())
    }

    pub fn snapshot_path(&self, snapshot_id: &str) -> String {
        format!("{}/{snapshot_id}.json", self.snapshots_dir())
    }

    pub fn pin_path(&self) -> String {
        format!("{AGENT_LAYER_DIR}/al.version")
    }

    pub fn config_path(&self) -> String {
        format!("{AGENT_LAYER_DIR}/config.toml")
    }

    pub fn dotenv_path(&self) -> String {
        format!("{AGENT_LAYER_DIR}/.env")
    }
}
