mod apply;
mod baseline;
mod clock;
mod config_keys;
mod diff_planner;
mod fs;
mod layout;
mod migrations;
mod ownership;
mod pins;
mod plan;
mod preview;
mod prompter;
mod readiness;
mod renames;
mod snapshots;
mod version;

pub use apply::{
    apply_upgrade_plan, AppliedItem, ApplyObserver, ApplyOptions, ApplyReport, ChangeCategory,
    PendingItem, PendingKind, SkipReason, SkippedItem,
};
pub use baseline::{
    fingerprint_for_policy, policy_for_template, read_baseline, serialize_baseline,
    write_baseline, BaselineEntry, BaselinePolicy, BaselineSource, ManagedBaseline,
    BASELINE_SCHEMA_VERSION,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config_keys::{
    apply_config_edits, convert_value, lookup_key, parse_config, plan_config_key_migrations,
    ConfigEdit,
};
pub use diff_planner::{plan_template_diff, read_installed_tree, InstalledTree, TemplateDiff};
pub use fs::{FileSystem, MemoryFileSystem, RealFileSystem};
pub use layout::RepoLayout;
pub use migrations::{
    evaluate_migrations, resolve_source_version, MigrationOutcome, MigrationState,
    ResolvedSourceVersion,
};
pub use ownership::{classify_ownership, ClassifyInput};
pub use pins::{plan_pin_version_change, read_pin, remove_pin, write_pin};
pub use plan::{build_upgrade_plan, PlanOptions, PlannedUpgrade, UpgradeContext};
pub use preview::{parse_diff_lines, render_diff_preview, DiffLineLimit, DEFAULT_DIFF_LINES};
pub use prompter::{
    CategoryFlags, Decision, InteractivePrompter, Prompter, RejectAll, ReviewBatch,
    ReviewOutcome, UnifiedReviewPrompter,
};
pub use readiness::{
    parse_dotenv, run_readiness_checks, DotenvEntry, EnvSource, MapEnv, ProcessEnv,
    ReadinessCheckId, ReadinessInputs,
};
pub use renames::{detect_renames, line_overlap, MEDIUM_SIMILARITY_THRESHOLD};
pub use snapshots::{
    validate_snapshot_id, ContentEncoding, RollbackOutcome, SnapshotEntry, SnapshotManager,
    SnapshotStatus, UpgradeSnapshot, SNAPSHOT_RETENTION, SNAPSHOT_SCHEMA_VERSION,
};
pub use version::{resolve_target_version, StaticVersionResolver, VersionRequest, VersionResolver};
