use super::*;
use crate::command_flows::{
    format_apply_report_lines, format_plan_lines, format_snapshot_lines, run_upgrade_apply_command,
    run_upgrade_plan_command, select_apply_mode, ApplyMode, CategorySelection, UpgradeSession,
};
use crate::completion::write_completions_script;
use crate::render::{
    format_readiness_lines, render_status_line, resolve_output_style, OutputStyle,
    TerminalRenderer,
};
use agent_layer_core::{
    MigrationKind, MigrationStatus, Ownership, OwnershipState, PinAction, PinVersionChange,
    ReadinessCheck, SourceVersionOrigin, UpgradeChange, UpgradeMigrationEntry,
    UpgradeMigrationReport, UpgradePlan, UPGRADE_PLAN_SCHEMA_VERSION,
};
use agent_layer_templates::TemplateSet;
use agent_layer_upgrade::{AppliedItem, ApplyReport, SkipReason, SkippedItem};
use clap::error::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args.iter().copied()).expect("command must parse")
}

fn apply_args(cli: Cli) -> ApplyArgs {
    match cli.command {
        Commands::Upgrade(UpgradeArgs {
            command: None,
            apply,
        }) => apply,
        other => panic!("unexpected command: {other:?}"),
    }
}

fn temp_repo() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "agent-layer-cli-test-{}-{nanos}-{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(path.join(".agent-layer")).expect("must create repo dir");
    path
}

fn empty_plan() -> UpgradePlan {
    UpgradePlan {
        schema_version: UPGRADE_PLAN_SCHEMA_VERSION,
        dry_run: true,
        template_additions: Vec::new(),
        template_updates: Vec::new(),
        section_aware_updates: Vec::new(),
        template_renames: Vec::new(),
        template_removals_or_orphans: Vec::new(),
        config_key_migrations: Vec::new(),
        migration_report: UpgradeMigrationReport {
            target_version: Some("0.7.0".to_string()),
            source_version: Some("0.7.0".to_string()),
            source_version_origin: SourceVersionOrigin::PinFile,
            source_resolution_notes: Vec::new(),
            entries: Vec::new(),
        },
        pin_version_change: PinVersionChange {
            current: Some("0.7.0".to_string()),
            target: Some("0.7.0".to_string()),
            action: PinAction::None,
        },
        readiness_checks: Vec::new(),
    }
}

#[test]
fn cli_parses_upgrade_with_category_flags() {
    let args = apply_args(parse(&[
        "al",
        "upgrade",
        "--yes",
        "--apply-managed-updates",
        "--apply-deletions",
        "--diff-lines",
        "12",
        "--version",
        "0.7.0",
    ]));

    assert!(args.yes);
    assert!(args.apply_managed_updates);
    assert!(!args.apply_memory_updates);
    assert!(args.apply_deletions);
    assert_eq!(args.target.diff_lines.map(|limit| limit.get()), Some(12));
    assert_eq!(args.target.version.map(|v| v.to_string()), Some("0.7.0".to_string()));
}

#[test]
fn cli_parses_upgrade_plan_with_json_and_latest() {
    let cli = parse(&["al", "upgrade", "plan", "--version", "latest", "--json"]);
    match cli.command {
        Commands::Upgrade(UpgradeArgs {
            command: Some(UpgradeCommand::Plan(plan)),
            ..
        }) => {
            assert!(plan.json);
            assert_eq!(plan.target.version, Some(VersionRequest::Latest));
            assert_eq!(plan.target.diff_lines, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_accepts_global_repo_root_after_subcommand() {
    let cli = parse(&["al", "upgrade", "plan", "--repo-root", "/tmp/project"]);
    assert_eq!(cli.repo_root, Some(PathBuf::from("/tmp/project")));
}

#[test]
fn cli_rejects_zero_diff_lines() {
    let err = Cli::try_parse_from(["al", "upgrade", "plan", "--diff-lines", "0"])
        .expect_err("zero diff lines must fail");
    assert_eq!(err.kind(), ErrorKind::ValueValidation);
    assert!(err.to_string().contains("invalid value for --diff-lines"));
}

#[test]
fn cli_rejects_negative_and_non_numeric_diff_lines() {
    for value in ["-3", "ten"] {
        let err = Cli::try_parse_from(["al", "upgrade", "--diff-lines", value])
            .expect_err("invalid diff lines must fail");
        assert!(
            err.to_string().contains("invalid value for --diff-lines"),
            "unexpected error for {value}: {err}"
        );
    }
}

#[test]
fn cli_rejects_malformed_version() {
    let err = Cli::try_parse_from(["al", "upgrade", "plan", "--version", "next"])
        .expect_err("malformed version must fail");
    assert!(err.to_string().contains("expected X.Y.Z or 'latest'"));
}

#[test]
fn cli_rejects_per_file_with_yes() {
    let err = Cli::try_parse_from(["al", "upgrade", "--per-file", "--yes"])
        .expect_err("conflicting flags must fail");
    assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
}

#[test]
fn cli_rejects_apply_flags_combined_with_plan() {
    let _err = Cli::try_parse_from(["al", "upgrade", "--yes", "plan"])
        .expect_err("apply flags must not combine with a subcommand");
}

#[test]
fn cli_parses_rollback_id_and_list() {
    match parse(&["al", "upgrade", "rollback", "upgrade-20260101T000000Z-1"]).command {
        Commands::Upgrade(UpgradeArgs {
            command: Some(UpgradeCommand::Rollback(rollback)),
            ..
        }) => {
            assert_eq!(
                rollback.snapshot_id.as_deref(),
                Some("upgrade-20260101T000000Z-1")
            );
            assert!(!rollback.list);
        }
        other => panic!("unexpected command: {other:?}"),
    }

    match parse(&["al", "upgrade", "rollback", "--list"]).command {
        Commands::Upgrade(UpgradeArgs {
            command: Some(UpgradeCommand::Rollback(rollback)),
            ..
        }) => {
            assert!(rollback.list);
            assert_eq!(rollback.snapshot_id, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_rollback_without_id_or_list() {
    let err = Cli::try_parse_from(["al", "upgrade", "rollback"])
        .expect_err("rollback needs a target");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn cli_rejects_rollback_id_with_list() {
    let err = Cli::try_parse_from(["al", "upgrade", "rollback", "upgrade-1", "--list"])
        .expect_err("id and --list conflict");
    assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
}

#[test]
fn cli_parses_completions_for_each_supported_shell() {
    let cases = vec![
        ("bash", CliCompletionShell::Bash),
        ("zsh", CliCompletionShell::Zsh),
        ("fish", CliCompletionShell::Fish),
        ("powershell", CliCompletionShell::Powershell),
    ];

    for (shell, expected) in cases {
        let cli = Cli::try_parse_from(["al", "completions", shell]).expect("command parses");
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, expected),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

#[test]
fn cli_rejects_unsupported_completion_shell() {
    let err = Cli::try_parse_from(["al", "completions", "elvish"])
        .expect_err("unsupported shell must fail");
    let rendered = err.to_string();
    assert!(rendered.contains("elvish"));
    assert!(rendered.contains("possible values"));
}

#[test]
fn completion_scripts_target_al_binary() {
    for shell in [
        CliCompletionShell::Bash,
        CliCompletionShell::Zsh,
        CliCompletionShell::Fish,
        CliCompletionShell::Powershell,
    ] {
        let mut output = Vec::new();
        write_completions_script(shell, &mut output)
            .expect("completion script generation should succeed");
        let rendered = String::from_utf8(output).expect("completion script should be utf-8");
        assert!(
            rendered.contains("al"),
            "completion script should name the binary for {shell:?}"
        );
        assert!(
            rendered.contains("upgrade"),
            "completion script should list subcommands for {shell:?}"
        );
    }
}

#[test]
fn apply_mode_with_yes_auto_accepts_selected_categories() {
    let args = apply_args(parse(&[
        "al",
        "upgrade",
        "--yes",
        "--apply-memory-updates",
    ]));
    let mode = select_apply_mode(&args, false).expect("mode must resolve");
    assert_eq!(
        mode,
        ApplyMode::AutoAccept(CategorySelection {
            managed: false,
            memory: true,
            deletions: false,
        })
    );
}

#[test]
fn apply_mode_flags_without_yes_confirm_on_terminal() {
    let args = apply_args(parse(&["al", "upgrade", "--apply-deletions"]));
    let mode = select_apply_mode(&args, true).expect("mode must resolve");
    assert_eq!(
        mode,
        ApplyMode::ConfirmDeletions(CategorySelection {
            managed: false,
            memory: false,
            deletions: true,
        })
    );
}

#[test]
fn apply_mode_non_interactive_requires_yes() {
    let args = apply_args(parse(&["al", "upgrade", "--apply-managed-updates"]));
    let err = select_apply_mode(&args, false).expect_err("missing --yes must fail");
    assert!(err.to_string().contains("requires --yes"));
}

#[test]
fn apply_mode_non_interactive_without_flags_fails() {
    let args = apply_args(parse(&["al", "upgrade"]));
    let err = select_apply_mode(&args, false).expect_err("no terminal must fail");
    assert!(err.to_string().contains("interactive terminal"));
}

#[test]
fn apply_mode_yes_without_categories_fails() {
    let args = apply_args(parse(&["al", "upgrade", "--yes"]));
    let err = select_apply_mode(&args, true).expect_err("bare --yes must fail");
    assert!(err.to_string().contains("--apply-managed-updates"));
}

#[test]
fn apply_mode_on_terminal_defaults_to_unified_review() {
    let args = apply_args(parse(&["al", "upgrade"]));
    assert_eq!(
        select_apply_mode(&args, true).expect("mode must resolve"),
        ApplyMode::UnifiedReview
    );

    let args = apply_args(parse(&["al", "upgrade", "--per-file"]));
    assert_eq!(
        select_apply_mode(&args, true).expect("mode must resolve"),
        ApplyMode::PerFile
    );
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "update .agent-layer/instructions/00_base.md"),
        "update .agent-layer/instructions/00_base.md"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "rolled back upgrade-1"),
        "[OK] rolled back upgrade-1"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "skipped removal"),
        "[WARN] skipped removal"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "no rollback needed"),
        "[..] no rollback needed"
    );
}

#[test]
fn output_style_honours_explicit_request_then_terminal() {
    assert_eq!(resolve_output_style(Some("plain"), false, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(Some("RICH"), true, false), OutputStyle::Rich);
    assert_eq!(resolve_output_style(None, false, true), OutputStyle::Rich);
    assert_eq!(resolve_output_style(None, true, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(Some("fancy"), false, false), OutputStyle::Plain);
}

#[test]
fn readiness_lines_cap_details() {
    let check = ReadinessCheck {
        id: "unrecognized_config_keys".to_string(),
        summary: "config.toml contains keys this release does not recognize".to_string(),
        recommended_action: "remove or rename the listed keys".to_string(),
        details: (1..=7).map(|n| format!("key_{n}")).collect(),
    };

    let lines = format_readiness_lines(OutputStyle::Rich, &[check]);

    assert_eq!(
        lines[0],
        "[WARN] unrecognized_config_keys: config.toml contains keys this release does not recognize"
    );
    assert_eq!(lines[1], "    - key_1");
    assert_eq!(lines[5], "    - key_5");
    assert_eq!(lines[6], "    - ... and 2 more");
    assert_eq!(lines[7], "    action: remove or rename the listed keys");
    assert_eq!(lines.len(), 8);
}

#[test]
fn plan_lines_report_up_to_date() {
    let lines = format_plan_lines(OutputStyle::Plain, &empty_plan());
    assert_eq!(
        lines,
        vec![
            "target version: 0.7.0".to_string(),
            "source version: 0.7.0 (pin_file)".to_string(),
            "templates are already up to date".to_string(),
        ]
    );
}

#[test]
fn plan_lines_group_changes_with_ownership() {
    let mut plan = empty_plan();
    plan.migration_report.target_version = None;
    plan.template_updates.push(UpgradeChange {
        path: ".agent-layer/instructions/00_base.md".to_string(),
        ownership: Ownership::LocalCustomization,
        ownership_state: Some(OwnershipState::UserModified),
        ownership_reason_codes: Vec::new(),
    });
    plan.migration_report.entries.push(UpgradeMigrationEntry {
        id: "0.7.0-drop-legacy-prompt".to_string(),
        kind: MigrationKind::DeleteFile,
        rationale: "legacy prompt replaced".to_string(),
        status: MigrationStatus::SkippedUnknownSource,
        skip_reason: Some("source version unknown".to_string()),
    });
    plan.pin_version_change = PinVersionChange {
        current: Some("0.6.0".to_string()),
        target: None,
        action: PinAction::Remove,
    };

    let lines = format_plan_lines(OutputStyle::Plain, &plan);

    assert_eq!(lines[0], "target version: development build");
    assert!(lines.contains(&"template updates (1):".to_string()));
    assert!(lines.contains(
        &"  ~ .agent-layer/instructions/00_base.md [user_modified, local_customization]"
            .to_string()
    ));
    assert!(lines.contains(
        &"  0.7.0-drop-legacy-prompt delete_file skipped_unknown_source (reason=source version unknown)"
            .to_string()
    ));
    assert!(lines.contains(&"pin version: remove 0.6.0 -> (none)".to_string()));
}

#[test]
fn apply_report_lines_list_skips_and_rollback_hint() {
    let report = ApplyReport {
        snapshot_id: Some("upgrade-20260101T000000Z-1".to_string()),
        applied: vec![AppliedItem {
            path: ".agent-layer/instructions/00_base.md".to_string(),
            action: "update".to_string(),
        }],
        skipped: vec![SkippedItem {
            path: ".agent-layer/instructions/99_old.md".to_string(),
            action: "removal".to_string(),
            reason: SkipReason::DeletionsNotRequested,
        }],
        baseline_written: true,
        pruned_snapshots: Vec::new(),
    };

    let lines = format_apply_report_lines(OutputStyle::Rich, &report);

    assert_eq!(
        lines,
        vec![
            "[OK] update .agent-layer/instructions/00_base.md".to_string(),
            "[WARN] skipped removal .agent-layer/instructions/99_old.md (reason=deletions not requested)"
                .to_string(),
            "[..] snapshot=upgrade-20260101T000000Z-1; undo with `al upgrade rollback upgrade-20260101T000000Z-1`"
                .to_string(),
        ]
    );
}

#[test]
fn session_rejects_missing_repo_root() {
    let missing = std::env::temp_dir().join("agent-layer-cli-test-missing-root-does-not-exist");
    let err = UpgradeSession::open(Some(&missing))
        .err()
        .expect("missing root must fail");
    assert!(err.to_string().contains("repository root not found"));
}

#[test]
fn non_interactive_apply_installs_templates_then_plan_is_clean() {
    let root = temp_repo();
    let session = UpgradeSession::open(Some(&root)).expect("must open session");
    let renderer = TerminalRenderer::from_style(OutputStyle::Plain);
    let args = apply_args(parse(&[
        "al",
        "upgrade",
        "--yes",
        "--apply-managed-updates",
        "--apply-memory-updates",
        "--apply-deletions",
    ]));

    run_upgrade_apply_command(renderer, &session, &args).expect("apply must succeed");

    for path in TemplateSet::embedded().paths() {
        assert!(root.join(path).is_file(), "{path} must be installed");
    }
    assert!(root
        .join(".agent-layer/state/managed-baseline.json")
        .is_file());

    let plan_cli = parse(&["al", "upgrade", "plan"]);
    let Commands::Upgrade(UpgradeArgs {
        command: Some(UpgradeCommand::Plan(plan_args)),
        ..
    }) = plan_cli.command
    else {
        panic!("unexpected command");
    };
    run_upgrade_plan_command(renderer, &session, &plan_args).expect("plan must succeed");

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn snapshot_lines_show_status_and_counts() {
    use agent_layer_upgrade::{SnapshotStatus, UpgradeSnapshot, SNAPSHOT_SCHEMA_VERSION};

    let created = "2026-01-01T00:00:00Z"
        .parse()
        .expect("timestamp must parse");
    let snapshot = UpgradeSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        snapshot_id: "upgrade-20260101T000000Z-1".to_string(),
        created_at_utc: created,
        status: SnapshotStatus::RolledBack,
        rolled_back_at_utc: Some(created),
        entries: Vec::new(),
    };

    assert_eq!(
        format_snapshot_lines(&[snapshot]),
        vec![
            "upgrade-20260101T000000Z-1 rolled_back created=2026-01-01T00:00:00Z files=0 rolled_back=2026-01-01T00:00:00Z"
                .to_string()
        ]
    );
}
