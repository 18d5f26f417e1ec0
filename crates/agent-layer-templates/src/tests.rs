use super::*;
use agent_layer_core::{has_entries_marker, MigrationKind};

#[test]
fn embedded_templates_are_sorted_and_non_empty() {
    let set = TemplateSet::embedded();
    assert!(!set.is_empty());

    let paths = set.paths().collect::<Vec<_>>();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert!(set.iter().all(|template| !template.content.trim().is_empty()));
}

#[test]
fn embedded_memory_templates_carry_entries_marker() {
    let set = TemplateSet::embedded();
    let memory = set
        .iter()
        .filter(|template| template.category() == FileCategory::Memory)
        .collect::<Vec<_>>();
    assert_eq!(memory.len(), 5);
    assert!(memory
        .iter()
        .all(|template| has_entries_marker(template.content)));
}

#[test]
fn embedded_managed_templates_have_no_entries_marker() {
    let set = TemplateSet::embedded();
    assert!(set
        .iter()
        .filter(|template| template.category() == FileCategory::Managed)
        .all(|template| !has_entries_marker(template.content)));
}

#[test]
fn file_category_matches_memory_dir_prefix_only() {
    assert_eq!(
        file_category("docs/agent-layer/ROADMAP.md"),
        FileCategory::Memory
    );
    assert_eq!(
        file_category("docs/agent-layer-notes/ROADMAP.md"),
        FileCategory::Managed
    );
    assert_eq!(
        file_category(".agent-layer/instructions/00_base.md"),
        FileCategory::Managed
    );
}

#[test]
fn is_in_managed_dir_requires_a_child_path() {
    assert!(is_in_managed_dir(".agent-layer/slash-commands/custom.md"));
    assert!(is_in_managed_dir(".agent-layer/instructions/nested/x.md"));
    assert!(!is_in_managed_dir(".agent-layer/slash-commands"));
    assert!(!is_in_managed_dir(".agent-layer/slash-commands-extra/x.md"));
    assert!(!is_in_managed_dir(".agent-layer/config.toml"));
}

#[test]
fn managed_purpose_uses_parent_and_category() {
    assert_eq!(
        managed_purpose(".agent-layer/slash-commands/find-issues.md"),
        (FileCategory::Managed, ".agent-layer/slash-commands")
    );
    assert_ne!(
        managed_purpose(".agent-layer/slash-commands/find-issues.md"),
        managed_purpose(".agent-layer/instructions/find-issues.md")
    );
}

#[test]
fn embedded_catalog_parses_in_version_order() {
    let catalog = MigrationCatalog::embedded().expect("embedded catalog must parse");
    let versions = catalog
        .manifests()
        .iter()
        .map(|manifest| manifest.target_version.to_string())
        .collect::<Vec<_>>();
    assert_eq!(versions, vec!["0.6.0", "0.7.0"]);
    assert_eq!(
        catalog.manifests()[0].operations[0].kind,
        MigrationKind::ConfigRenameKey
    );
}

#[test]
fn catalog_sorts_manifests_by_version() {
    let later = MigrationCatalog::parse_manifest(
        r#"{"schema_version":1,"target_version":"1.2.0","operations":[]}"#,
    )
    .expect("must parse");
    let earlier = MigrationCatalog::parse_manifest(
        r#"{"schema_version":1,"target_version":"1.0.0","operations":[]}"#,
    )
    .expect("must parse");

    let catalog = MigrationCatalog::from_manifests(vec![later, earlier]).expect("must build");
    assert_eq!(catalog.manifests()[0].target_version.to_string(), "1.0.0");
}

#[test]
fn catalog_rejects_duplicate_ids() {
    let raw = r#"{
        "schema_version": 1,
        "target_version": "1.0.0",
        "operations": [
            {"id": "dup", "kind": "delete_file", "rationale": "r", "from": "a"},
            {"id": "dup", "kind": "delete_file", "rationale": "r", "from": "b"}
        ]
    }"#;
    let manifest = MigrationCatalog::parse_manifest(raw).expect("must parse");
    let err = MigrationCatalog::from_manifests(vec![manifest]).expect_err("must reject");
    assert!(err.to_string().contains("duplicate migration id 'dup'"));
}

#[test]
fn catalog_rejects_missing_required_field() {
    let raw = r#"{
        "schema_version": 1,
        "target_version": "1.0.0",
        "operations": [
            {"id": "rename", "kind": "rename_file", "rationale": "r", "from": "a"}
        ]
    }"#;
    let manifest = MigrationCatalog::parse_manifest(raw).expect("must parse");
    let err = MigrationCatalog::from_manifests(vec![manifest]).expect_err("must reject");
    assert!(err.to_string().contains("missing required field 'to'"));
}

#[test]
fn catalog_rejects_unsupported_schema_version() {
    let manifest = MigrationCatalog::parse_manifest(
        r#"{"schema_version":2,"target_version":"1.0.0","operations":[]}"#,
    )
    .expect("must parse");
    let err = MigrationCatalog::from_manifests(vec![manifest]).expect_err("must reject");
    assert!(err
        .to_string()
        .contains("unsupported migration manifest schema_version 2"));
}

#[test]
fn parse_manifest_rejects_unknown_fields() {
    let err = MigrationCatalog::parse_manifest(
        r#"{"schema_version":1,"target_version":"1.0.0","operations":[],"extra":true}"#,
    )
    .expect_err("must reject unknown field");
    assert!(format!("{err:#}").contains("unknown field"));
}
