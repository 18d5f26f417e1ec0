use std::collections::BTreeSet;

use agent_layer_core::{
    MigrationKind, MigrationStatus, SourceVersionOrigin, UpgradeMigrationEntry,
    UpgradeMigrationReport,
};
use agent_layer_templates::{MigrationCatalog, MigrationOperation};
use semver::Version;
use tracing::{debug, warn};

use crate::config_keys::{convert_value, has_type, lookup_key, ConfigEdit};
use crate::pins::parse_pin_version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSourceVersion {
    pub version: Option<Version>,
    pub origin: SourceVersionOrigin,
    pub notes: Vec<String>,
}

/// Pin file first, then the baseline's recorded version, else unknown. Every
/// step that could not be used leaves a note.
pub fn resolve_source_version(
    pin: Option<&str>,
    baseline_present: bool,
    baseline_version: Option<&str>,
) -> ResolvedSourceVersion {
    let mut notes = Vec::new();

    match pin {
        Some(raw) => match parse_pin_version(raw) {
            Some(version) => {
                return ResolvedSourceVersion {
                    version: Some(version),
                    origin: SourceVersionOrigin::PinFile,
                    notes,
                }
            }
            None => notes.push(format!(
                "pin file value '{raw}' is not a valid version; ignoring it"
            )),
        },
        None => notes.push("pin file .agent-layer/al.version is not present".to_string()),
    }

    match (baseline_present, baseline_version) {
        (false, _) => notes.push("no managed baseline is recorded".to_string()),
        (true, None) => notes.push("managed baseline does not record a template version".to_string()),
        (true, Some(raw)) => match parse_pin_version(raw) {
            Some(version) => {
                return ResolvedSourceVersion {
                    version: Some(version),
                    origin: SourceVersionOrigin::Baseline,
                    notes,
                }
            }
            None => notes.push(format!(
                "managed baseline version '{raw}' is not a valid version; ignoring it"
            )),
        },
    }

    notes.push(
        "source version is unknown; data-destructive migrations are skipped".to_string(),
    );
    ResolvedSourceVersion {
        version: None,
        origin: SourceVersionOrigin::Unknown,
        notes,
    }
}

/// Repository facts the engine evaluates operations against. Planned
/// operations update this copy so later operations see their effect.
#[derive(Debug, Clone, Default)]
pub struct MigrationState {
    pub existing_files: BTreeSet<String>,
    pub config: Option<toml::Table>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub report: UpgradeMigrationReport,
    pub planned: Vec<MigrationOperation>,
    pub projected_config: Option<toml::Table>,
}

pub(crate) fn catalog_file_paths(catalog: &MigrationCatalog) -> Vec<String> {
    let mut paths = BTreeSet::new();
    for manifest in catalog.manifests() {
        for operation in &manifest.operations {
            if operation.kind.touches_files() {
                paths.extend(operation.from.iter().cloned());
                paths.extend(operation.to.iter().cloned());
            }
        }
    }
    paths.into_iter().collect()
}

fn is_applicable(version: &Version, source: Option<&Version>, target: Option<&Version>) -> bool {
    source.is_none_or(|source| version > source) && target.is_none_or(|target| version <= target)
}

enum Evaluation {
    Satisfied,
    Conflict(String),
    Ready,
}

fn evaluate(operation: &MigrationOperation, state: &MigrationState) -> Evaluation {
    let from = operation.from.as_deref().unwrap_or_default();
    match operation.kind {
        MigrationKind::RenameFile => {
            let to = operation.to.as_deref().unwrap_or_default();
            if !state.existing_files.contains(from) {
                Evaluation::Satisfied
            } else if state.existing_files.contains(to) {
                Evaluation::Conflict(format!(
                    "both {from} and {to} exist; leaving both in place"
                ))
            } else {
                Evaluation::Ready
            }
        }
        MigrationKind::DeleteFile | MigrationKind::DeleteGeneratedArtifact => {
            if state.existing_files.contains(from) {
                Evaluation::Ready
            } else {
                Evaluation::Satisfied
            }
        }
        MigrationKind::ConfigRenameKey => {
            let to = operation.to.as_deref().unwrap_or_default();
            let Some(config) = &state.config else {
                return Evaluation::Satisfied;
            };
            if lookup_key(config, from).is_none() {
                Evaluation::Satisfied
            } else if lookup_key(config, to).is_some() {
                Evaluation::Conflict(format!(
                    "config keys '{from}' and '{to}' are both set; resolve by hand"
                ))
            } else {
                Evaluation::Ready
            }
        }
        MigrationKind::ConfigSetDefault => {
            let key = operation.key.as_deref().unwrap_or_default();
            match &state.config {
                None => Evaluation::Conflict("config file is not present".to_string()),
                Some(config) if lookup_key(config, key).is_some() => Evaluation::Satisfied,
                Some(_) => Evaluation::Ready,
            }
        }
        MigrationKind::ConfigRetypeKey => {
            let key = operation.key.as_deref().unwrap_or_default();
            let (Some(config), Some(to_type)) = (&state.config, operation.to_type) else {
                return Evaluation::Satisfied;
            };
            match lookup_key(config, key) {
                None => Evaluation::Satisfied,
                Some(value) if has_type(value, to_type) => Evaluation::Satisfied,
                Some(value) if convert_value(value, to_type).is_none() => {
                    Evaluation::Conflict(format!(
                        "config key '{key}' cannot be converted to {}; update it by hand",
                        to_type.as_str()
                    ))
                }
                Some(_) => Evaluation::Ready,
            }
        }
    }
}

fn record_effect(operation: &MigrationOperation, state: &mut MigrationState) {
    match operation.kind {
        MigrationKind::RenameFile => {
            if let Some(from) = &operation.from {
                state.existing_files.remove(from);
            }
            if let Some(to) = &operation.to {
                state.existing_files.insert(to.clone());
            }
        }
        MigrationKind::DeleteFile | MigrationKind::DeleteGeneratedArtifact => {
            if let Some(from) = &operation.from {
                state.existing_files.remove(from);
            }
        }
        MigrationKind::ConfigRenameKey
        | MigrationKind::ConfigSetDefault
        | MigrationKind::ConfigRetypeKey => {
            if let (Some(edit), Some(config)) =
                (ConfigEdit::from_operation(operation), state.config.as_mut())
            {
                edit.simulate(config);
            }
        }
    }
}

/// Walks applicable manifests in release order and operations in declared
/// order; nothing is reordered.
pub fn evaluate_migrations(
    catalog: &MigrationCatalog,
    target: Option<&Version>,
    source: &ResolvedSourceVersion,
    mut state: MigrationState,
) -> MigrationOutcome {
    let mut entries = Vec::new();
    let mut planned = Vec::new();

    for manifest in catalog.manifests() {
        if !is_applicable(&manifest.target_version, source.version.as_ref(), target) {
            continue;
        }
        for operation in &manifest.operations {
            let (status, skip_reason) = match evaluate(operation, &state) {
                Evaluation::Satisfied => (MigrationStatus::Noop, None),
                Evaluation::Ready | Evaluation::Conflict(_)
                    if source.version.is_none() && operation.kind.is_data_destructive() =>
                {
                    (
                        MigrationStatus::SkippedUnknownSource,
                        Some(format!(
                            "source version is unknown and {} is data-destructive; pin .agent-layer/al.version to the previously installed release to run it",
                            operation.kind.as_str()
                        )),
                    )
                }
                Evaluation::Conflict(reason) => (MigrationStatus::Noop, Some(reason)),
                Evaluation::Ready => (MigrationStatus::Planned, None),
            };

            match status {
                MigrationStatus::Planned => {
                    record_effect(operation, &mut state);
                    planned.push(operation.clone());
                }
                MigrationStatus::SkippedUnknownSource => warn!(
                    id = operation.id.as_str(),
                    kind = operation.kind.as_str(),
                    "skipped migration: source version unknown"
                ),
                MigrationStatus::Noop => {}
            }

            entries.push(UpgradeMigrationEntry {
                id: operation.id.clone(),
                kind: operation.kind,
                rationale: operation.rationale.clone(),
                status,
                skip_reason,
            });
        }
    }

    debug!(
        entries = entries.len(),
        planned = planned.len(),
        "evaluated migrations"
    );
    MigrationOutcome {
        report: UpgradeMigrationReport {
            target_version: target.map(Version::to_string),
            source_version: source.version.as_ref().map(Version::to_string),
            source_version_origin: source.origin,
            source_resolution_notes: source.notes.clone(),
            entries,
        },
        planned,
        projected_config: state.config,
    }
}
