use super::*;

#[test]
fn fingerprint_ignores_crlf_line_endings() {
    let unix = fingerprint_content(b"line one\nline two\n");
    let windows = fingerprint_content(b"line one\r\nline two\r\n");
    assert_eq!(unix, windows);
    assert!(unix.as_str().starts_with("sha256:"));
    assert_eq!(unix.as_str().len(), "sha256:".len() + 64);
}

#[test]
fn fingerprint_distinguishes_content() {
    assert_ne!(fingerprint_content(b"a\n"), fingerprint_content(b"b\n"));
}

#[test]
fn fingerprint_parse_rejects_missing_prefix_and_bad_digest() {
    let err = Fingerprint::parse("md5:abc").expect_err("must reject prefix");
    assert!(err.to_string().contains("expected 'sha256:' prefix"));

    let err = Fingerprint::parse("sha256:xyz").expect_err("must reject digest");
    assert!(err.to_string().contains("expected 64 hex characters"));
}

#[test]
fn fingerprint_deserialize_validates() {
    let err = serde_json::from_str::<Fingerprint>("\"sha256:1234\"")
        .expect_err("short digest must fail");
    assert!(err.to_string().contains("64 hex characters"));

    let valid = fingerprint_content(b"x");
    let raw = serde_json::to_string(&valid).expect("must serialize");
    let parsed: Fingerprint = serde_json::from_str(&raw).expect("must parse");
    assert_eq!(parsed, valid);
}

#[test]
fn normalize_line_endings_keeps_lone_carriage_returns() {
    assert_eq!(normalize_line_endings(b"a\rb\r\n").as_ref(), b"a\rb\n");
}

#[test]
fn managed_region_includes_marker_line() {
    let content = format!("# Roadmap\n\nIntro\n{ENTRIES_MARKER}\n\n- phase one\n");
    let region = managed_region(&content).expect("marker present");
    assert_eq!(region, format!("# Roadmap\n\nIntro\n{ENTRIES_MARKER}\n"));
}

#[test]
fn managed_region_is_none_without_marker() {
    assert!(managed_region("# Plain\n").is_none());
    assert!(!has_entries_marker("# Plain\n"));
}

#[test]
fn merge_managed_section_preserves_user_entries_verbatim() {
    let template = format!("# Roadmap v2\n\nNew guidance\n{ENTRIES_MARKER}\n");
    let installed = format!("# Roadmap\n\nOld guidance\n{ENTRIES_MARKER}\n\n## Phase 1\n- shipped\n");

    let merged = merge_managed_section(&template, &installed);
    assert_eq!(
        merged,
        format!("# Roadmap v2\n\nNew guidance\n{ENTRIES_MARKER}\n\n## Phase 1\n- shipped\n")
    );
}

#[test]
fn merge_managed_section_keeps_everything_when_installed_marker_missing() {
    let template = format!("# Issues\n{ENTRIES_MARKER}\n");
    let installed = "my own notes\n";

    let merged = merge_managed_section(&template, installed);
    assert_eq!(merged, format!("# Issues\n{ENTRIES_MARKER}\nmy own notes\n"));
}

#[test]
fn merge_managed_section_terminates_marker_line_without_newline() {
    let template = format!("# Issues\n{ENTRIES_MARKER}");
    let installed = format!("# Issues\n{ENTRIES_MARKER}\n- bug\n");

    let merged = merge_managed_section(&template, &installed);
    assert_eq!(merged, format!("# Issues\n{ENTRIES_MARKER}\n- bug\n"));
}

#[test]
fn strip_version_stamp_removes_only_stamp_lines() {
    let stamped = format!("{}\n# Find issues\nbody\n", version_stamp_line("0.6.1"));
    assert_eq!(strip_version_stamp(&stamped), "# Find issues\nbody\n");
    assert_eq!(strip_version_stamp("# untouched\n"), "# untouched\n");
}

#[test]
fn migration_kind_destructiveness() {
    assert!(MigrationKind::RenameFile.is_data_destructive());
    assert!(MigrationKind::DeleteFile.is_data_destructive());
    assert!(MigrationKind::ConfigRenameKey.is_data_destructive());
    assert!(!MigrationKind::ConfigSetDefault.is_data_destructive());
    assert!(MigrationKind::DeleteGeneratedArtifact.touches_files());
    assert!(!MigrationKind::ConfigRetypeKey.touches_files());
}

#[test]
fn ownership_requires_explicit_accept_for_local_and_unknown() {
    assert!(!Ownership::UpstreamTemplateDelta.requires_explicit_accept());
    assert!(Ownership::LocalCustomization.requires_explicit_accept());
    assert!(Ownership::UnknownNoBaseline.requires_explicit_accept());
}

#[test]
fn ownership_verdict_with_reason_deduplicates() {
    let verdict = OwnershipVerdict::new(
        OwnershipState::UserModified,
        Ownership::LocalCustomization,
        OwnershipReason::ContentDiffersFromBaseline,
    )
    .with_reason(OwnershipReason::ManagedMarkerMissing)
    .with_reason(OwnershipReason::ManagedMarkerMissing);
    assert_eq!(
        verdict.reasons,
        vec![
            OwnershipReason::ContentDiffersFromBaseline,
            OwnershipReason::ManagedMarkerMissing
        ]
    );
}

#[test]
fn upgrade_change_serializes_snake_case_tokens() {
    let change = UpgradeChange {
        path: ".agent-layer/instructions/00_base.md".to_string(),
        ownership: Ownership::LocalCustomization,
        ownership_state: Some(OwnershipState::UnknownNoBaseline),
        ownership_reason_codes: vec![OwnershipReason::NoBaselineRecorded],
    };
    let json = serde_json::to_value(&change).expect("must serialize");
    assert_eq!(json["ownership"], "local_customization");
    assert_eq!(json["ownership_state"], "unknown_no_baseline");
    assert_eq!(json["ownership_reason_codes"][0], "no_baseline_recorded");
}

#[test]
fn addition_omits_ownership_state() {
    let change = UpgradeChange {
        path: "x".to_string(),
        ownership: Ownership::UpstreamTemplateDelta,
        ownership_state: None,
        ownership_reason_codes: Vec::new(),
    };
    let json = serde_json::to_value(&change).expect("must serialize");
    assert!(json.get("ownership_state").is_none());
}

#[test]
fn rename_detection_serializes_kebab_case_tags() {
    let rename = UpgradeRename {
        from: ".agent-layer/slash-commands/find-issues.md".to_string(),
        to: ".agent-layer/slash-commands/find-issues-legacy.md".to_string(),
        ownership: Ownership::UpstreamTemplateDelta,
        ownership_state: OwnershipState::Renamed,
        ownership_reason_codes: vec![OwnershipReason::RenameDetected],
        confidence: RenameConfidence::High,
        detection: RenameDetection::ExactContentMatch,
    };
    let json = serde_json::to_value(&rename).expect("must serialize");
    assert_eq!(json["detection"], "exact-content-match");
    assert_eq!(json["confidence"], "high");

    let similar = serde_json::to_string(&RenameDetection::StructuralSimilarity)
        .expect("must serialize");
    assert_eq!(similar, "\"structural-similarity\"");
    assert_eq!(RenameDetection::StructuralSimilarity.as_str(), "structural-similarity");
    let parsed: RenameDetection =
        serde_json::from_str("\"exact-content-match\"").expect("must parse");
    assert_eq!(parsed, RenameDetection::ExactContentMatch);
}

#[test]
fn rename_confidence_rank_orders_high_first() {
    let mut tiers = vec![
        RenameConfidence::Low,
        RenameConfidence::High,
        RenameConfidence::Medium,
    ];
    tiers.sort_by_key(|tier| tier.rank());
    assert_eq!(
        tiers,
        vec![
            RenameConfidence::High,
            RenameConfidence::Medium,
            RenameConfidence::Low
        ]
    );
}
