use serde::{Deserialize, Serialize};

use crate::ownership::{Ownership, OwnershipReason, OwnershipState};

pub const UPGRADE_PLAN_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeChange {
    pub path: String,
    pub ownership: Ownership,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_state: Option<OwnershipState>,
    #[serde(default)]
    pub ownership_reason_codes: Vec<OwnershipReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameConfidence {
    High,
    Medium,
    Low,
}

impl RenameConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Lower rank sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenameDetection {
    ExactContentMatch,
    StructuralSimilarity,
}

impl RenameDetection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactContentMatch => "exact-content-match",
            Self::StructuralSimilarity => "structural-similarity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRename {
    pub from: String,
    pub to: String,
    pub ownership: Ownership,
    pub ownership_state: OwnershipState,
    #[serde(default)]
    pub ownership_reason_codes: Vec<OwnershipReason>,
    pub confidence: RenameConfidence,
    pub detection: RenameDetection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigKeyMigration {
    pub key: String,
    pub from: Option<serde_json::Value>,
    pub to: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    RenameFile,
    DeleteFile,
    DeleteGeneratedArtifact,
    ConfigRenameKey,
    ConfigSetDefault,
    ConfigRetypeKey,
}

impl MigrationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RenameFile => "rename_file",
            Self::DeleteFile => "delete_file",
            Self::DeleteGeneratedArtifact => "delete_generated_artifact",
            Self::ConfigRenameKey => "config_rename_key",
            Self::ConfigSetDefault => "config_set_default",
            Self::ConfigRetypeKey => "config_retype_key",
        }
    }

    /// Kinds whose effect cannot be reasoned about without knowing the prior
    /// release: running them against the wrong starting point loses data.
    pub fn is_data_destructive(self) -> bool {
        match self {
            Self::RenameFile
            | Self::DeleteFile
            | Self::DeleteGeneratedArtifact
            | Self::ConfigRenameKey
            | Self::ConfigRetypeKey => true,
            Self::ConfigSetDefault => false,
        }
    }

    pub fn touches_files(self) -> bool {
        matches!(
            self,
            Self::RenameFile | Self::DeleteFile | Self::DeleteGeneratedArtifact
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Planned,
    Noop,
    SkippedUnknownSource,
}

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Noop => "noop",
            Self::SkippedUnknownSource => "skipped_unknown_source",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeMigrationEntry {
    pub id: String,
    pub kind: MigrationKind,
    pub rationale: String,
    pub status: MigrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceVersionOrigin {
    PinFile,
    Baseline,
    Unknown,
}

impl SourceVersionOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PinFile => "pin_file",
            Self::Baseline => "baseline",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeMigrationReport {
    pub target_version: Option<String>,
    pub source_version: Option<String>,
    pub source_version_origin: SourceVersionOrigin,
    #[serde(default)]
    pub source_resolution_notes: Vec<String>,
    #[serde(default)]
    pub entries: Vec<UpgradeMigrationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessCheck {
    pub id: String,
    pub summary: String,
    pub recommended_action: String,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinAction {
    None,
    Add,
    Update,
    Remove,
}

impl PinAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinVersionChange {
    pub current: Option<String>,
    pub target: Option<String>,
    pub action: PinAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub schema_version: u32,
    pub dry_run: bool,
    pub template_additions: Vec<UpgradeChange>,
    pub template_updates: Vec<UpgradeChange>,
    pub section_aware_updates: Vec<UpgradeChange>,
    pub template_renames: Vec<UpgradeRename>,
    pub template_removals_or_orphans: Vec<UpgradeChange>,
    pub config_key_migrations: Vec<ConfigKeyMigration>,
    pub migration_report: UpgradeMigrationReport,
    pub pin_version_change: PinVersionChange,
    pub readiness_checks: Vec<ReadinessCheck>,
}

impl UpgradePlan {
    pub fn has_template_changes(&self) -> bool {
        !(self.template_additions.is_empty()
            && self.template_updates.is_empty()
            && self.section_aware_updates.is_empty()
            && self.template_renames.is_empty()
            && self.template_removals_or_orphans.is_empty())
    }

    pub fn has_changes(&self) -> bool {
        self.has_template_changes()
            || !self.config_key_migrations.is_empty()
            || self.pin_version_change.action != PinAction::None
            || self
                .migration_report
                .entries
                .iter()
                .any(|entry| entry.status == MigrationStatus::Planned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffPreview {
    pub path: String,
    pub unified_diff: String,
    pub truncated: bool,
    pub total_lines: usize,
}
