mod fingerprint;
mod ownership;
mod plan;
mod sections;

pub use fingerprint::{fingerprint_content, normalize_line_endings, Fingerprint};
pub use ownership::{Ownership, OwnershipReason, OwnershipState, OwnershipVerdict};
pub use plan::{
    ConfigKeyMigration, DiffPreview, MigrationKind, MigrationStatus, PinAction, PinVersionChange,
    ReadinessCheck, RenameConfidence, RenameDetection, SourceVersionOrigin, UpgradeChange,
    UpgradeMigrationEntry, UpgradeMigrationReport, UpgradePlan, UpgradeRename,
    UPGRADE_PLAN_SCHEMA_VERSION,
};
pub use sections::{
    has_entries_marker, managed_region, merge_managed_section, strip_version_stamp,
    version_stamp_line, ENTRIES_MARKER,
};

#[cfg(test)]
mod tests;
