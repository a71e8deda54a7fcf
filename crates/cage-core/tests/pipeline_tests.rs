use cage_core::prelude::*;
use cage_core::{DiffRecord, DiffRenderer, PlanRetention, UnifiedDiff, VIOLATION_MESSAGE};
use cage_test_utils::{count_kind, entries_since, kinds, AlwaysFail, AlwaysPass, TempRoom};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Replace a workspace file with a directory so the next write to it fails
fn swap_for_dir(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();
}

/// Renders normally, then sabotages the target before the write
struct SwapBeforeWrite(PathBuf);

impl DiffRenderer for SwapBeforeWrite {
    fn render(&self, original: &str, updated: &str, filename: &str) -> DiffRecord {
        swap_for_dir(&self.0, filename);
        UnifiedDiff::default().render(original, updated, filename)
    }
}

/// Fails the check and leaves the target unrestorable
struct SwapAndFail(PathBuf);

impl PostCondition for SwapAndFail {
    fn check(&self, _bench: &Workbench<'_>, target: &str) -> CheckResult {
        swap_for_dir(&self.0, target);
        CheckResult::fail("swapped")
    }
}

fn ready(room: &TempRoom, content: &str) -> Cage {
    room.write_workspace_file("f.txt", content);
    let cage = room.open();
    cage.rehydrate(None).unwrap();
    cage
}

#[test]
fn test_passing_check_commits_and_clears_plan() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only");
    let mark = cage.trail().entries().unwrap().len();

    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    let report = cage.apply().unwrap();

    assert!(report.success);
    assert_eq!(report.state, ApplyState::Committed);
    assert_eq!(room.read_workspace_file("f.txt"), "B only");
    assert!(!cage.plans().is_present());

    let added = entries_since(&cage, mark);
    assert_eq!(
        kinds(&added),
        vec![
            EntryKind::Plan,
            EntryKind::Diff,
            EntryKind::ApplyResult,
            EntryKind::Tests
        ]
    );
    assert_eq!(added[1].data["has_changes"], json!(true));
    assert_eq!(added[2].data["success"], json!(true));
    assert_eq!(added[3].data["passed"], json!(true));
    assert_eq!(added[3].data["details"], json!("All smoke tests passed"));
}

#[test]
fn test_failing_check_reverts_and_retains_plan() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only").with_postcondition(AlwaysFail);
    let mark = cage.trail().entries().unwrap().len();

    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    let report = cage.apply().unwrap();

    assert!(!report.success);
    assert_eq!(report.state, ApplyState::Reverted);
    assert_eq!(report.detail, "Tests failed, changes reverted");
    assert_eq!(report.revert_success, Some(true));
    assert_eq!(room.read_workspace_file("f.txt"), "A only");
    assert!(cage.plans().is_present());

    let added = entries_since(&cage, mark);
    assert_eq!(
        kinds(&added),
        vec![
            EntryKind::Plan,
            EntryKind::Diff,
            EntryKind::ApplyResult,
            EntryKind::Tests,
            EntryKind::Revert
        ]
    );
    assert_eq!(added[3].data["passed"], json!(false));
    assert_eq!(added[4].data["reason"], json!("test_failure"));
    assert_eq!(added[4].data["revert_success"], json!(true));
}

#[test]
fn test_clear_retention_drops_plan_after_revert() {
    let room = TempRoom::new();
    room.write_workspace_file("f.txt", "A only");
    let config = room.config().with_plan_retention(PlanRetention::Clear);
    let cage = Cage::open(config).unwrap().with_postcondition(AlwaysFail);
    cage.rehydrate(None).unwrap();

    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    let report = cage.apply().unwrap();

    assert_eq!(report.state, ApplyState::Reverted);
    assert!(!cage.plans().is_present());
}

#[test]
fn test_second_apply_is_refused_for_missing_plan() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only");
    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    assert!(cage.apply().unwrap().success);

    let err = cage.apply().unwrap_err();
    assert_eq!(err.violated_rule(), Some(Rule::PlanThenAct));
    assert_eq!(err.to_string(), VIOLATION_MESSAGE);

    let last = cage.recent(1).unwrap().remove(0);
    assert_eq!(last.kind, EntryKind::Violation);
    assert_eq!(last.data["rule"], json!("plan_then_act"));
    assert_eq!(last.data["message"], json!(VIOLATION_MESSAGE));
    assert_eq!(room.read_workspace_file("f.txt"), "B only");
}

#[test]
fn test_apply_before_rehydrate_writes_nothing() {
    let room = TempRoom::new();
    room.write_workspace_file("f.txt", "A only");
    let cage = room.open();
    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    let mark = cage.trail().entries().unwrap().len();

    let err = cage.apply().unwrap_err();

    assert_eq!(err.violated_rule(), Some(Rule::RehydrateBeforeAct));
    assert_eq!(room.read_workspace_file("f.txt"), "A only");
    assert_eq!(kinds(&entries_since(&cage, mark)), vec![EntryKind::Violation]);
    assert_eq!(count_kind(&cage, EntryKind::Violation), 1);
}

#[test]
fn test_plan_is_checked_before_rehydration() {
    let room = TempRoom::new();
    let cage = room.open();

    let err = cage.apply().unwrap_err();

    assert_eq!(err.violated_rule(), Some(Rule::PlanThenAct));
    assert_eq!(count_kind(&cage, EntryKind::Violation), 1);
}

#[test]
fn test_escaping_target_becomes_apply_error() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only").with_postcondition(AlwaysPass);
    cage.plan("escape", "../outside.txt", "", "pwned").unwrap();
    let mark = cage.trail().entries().unwrap().len();

    let report = cage.apply().unwrap();

    assert!(!report.success);
    assert_eq!(report.state, ApplyState::Failed);
    assert_eq!(report.detail, VIOLATION_MESSAGE);
    assert!(!room.path().join("outside.txt").exists());

    let added = entries_since(&cage, mark);
    assert_eq!(kinds(&added), vec![EntryKind::Violation, EntryKind::ApplyError]);
    assert_eq!(added[0].data["rule"], json!("workspace_only"));
    // a failed pipeline leaves the plan in place
    assert!(cage.plans().is_present());
}

#[test]
fn test_write_failure_records_apply_error_and_keeps_plan() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only").with_renderer(SwapBeforeWrite(room.workspace()));
    let mark = cage.trail().entries().unwrap().len();

    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    let report = cage.apply().unwrap();

    assert!(!report.success);
    assert_eq!(report.state, ApplyState::Failed);
    assert_eq!(report.tests, None);
    assert!(cage.plans().is_present());

    let added = entries_since(&cage, mark);
    assert_eq!(
        kinds(&added),
        vec![
            EntryKind::Plan,
            EntryKind::Diff,
            EntryKind::ApplyResult,
            EntryKind::ApplyError
        ]
    );
    assert_eq!(added[2].data["success"], json!(false));
    assert!(added[2].data["error"].is_string());
    assert!(!cage.session().diff_mode_active());
}

#[test]
fn test_failed_revert_reports_failure_and_keeps_plan() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only").with_postcondition(SwapAndFail(room.workspace()));
    let mark = cage.trail().entries().unwrap().len();

    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    let report = cage.apply().unwrap();

    assert!(!report.success);
    assert_eq!(report.state, ApplyState::Failed);
    assert_eq!(report.revert_success, Some(false));
    assert!(report.detail.starts_with("Tests failed and revert failed"));
    assert!(cage.plans().is_present());

    let added = entries_since(&cage, mark);
    assert_eq!(
        kinds(&added),
        vec![
            EntryKind::Plan,
            EntryKind::Diff,
            EntryKind::ApplyResult,
            EntryKind::Tests,
            EntryKind::Revert
        ]
    );
    assert_eq!(added[4].data["revert_success"], json!(false));
    assert_eq!(added[4].data["reason"], json!("test_failure"));
    assert!(added[4].data["error"].is_string());
}

#[test]
fn test_absent_target_is_created_then_reverted_as_empty() {
    let room = TempRoom::new();
    let cage = ready(&room, "unrelated");
    cage.plan("new file", "new.txt", "A", "B").unwrap();

    let report = cage.apply().unwrap();

    assert_eq!(report.state, ApplyState::Reverted);
    assert_eq!(report.tests.unwrap().details, "File is empty");
    assert_eq!(room.read_workspace_file("new.txt"), "");
}

#[test]
fn test_smoke_check_rejects_todo_marker() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only");
    cage.plan("mark it", "f.txt", "A", "TODO").unwrap();

    let report = cage.apply().unwrap();

    assert_eq!(report.state, ApplyState::Reverted);
    assert_eq!(
        report.tests.unwrap().details,
        "TODO markers found in content"
    );
    assert_eq!(room.read_workspace_file("f.txt"), "A only");
}

#[test]
fn test_smoke_check_rejects_blank_result() {
    let room = TempRoom::new();
    let cage = ready(&room, "A");
    cage.plan("blank it", "f.txt", "A", "  \n").unwrap();

    let report = cage.apply().unwrap();

    assert_eq!(report.state, ApplyState::Reverted);
    assert_eq!(report.tests.unwrap().details, "File is empty");
    assert_eq!(room.read_workspace_file("f.txt"), "A");
}

#[test]
fn test_configured_markers_replace_default() {
    let room = TempRoom::new();
    room.write_workspace_file("f.txt", "A only");
    let config = room
        .config()
        .with_forbidden_markers(vec!["FIXME".to_string()]);
    let cage = Cage::open(config).unwrap();
    cage.rehydrate(None).unwrap();

    cage.plan("todo is fine", "f.txt", "A", "TODO").unwrap();
    assert!(cage.apply().unwrap().success);

    cage.plan("fixme is not", "f.txt", "TODO", "FIXME").unwrap();
    let report = cage.apply().unwrap();
    assert_eq!(report.state, ApplyState::Reverted);
    assert_eq!(
        report.tests.unwrap().details,
        "FIXME markers found in content"
    );
    assert_eq!(room.read_workspace_file("f.txt"), "TODO only");
}

#[test]
fn test_empty_find_leaves_content_and_records_no_changes() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only");
    cage.plan("noop", "f.txt", "", "B").unwrap();
    let mark = cage.trail().entries().unwrap().len();

    assert!(cage.apply().unwrap().success);
    assert_eq!(room.read_workspace_file("f.txt"), "A only");

    let diff = &cage.trail().entries().unwrap()[mark];
    assert_eq!(diff.kind, EntryKind::Diff);
    assert_eq!(diff.data["has_changes"], json!(false));
    assert_eq!(diff.data["diff"], json!(""));
}

#[test]
fn test_truncated_trail_is_fatal_for_apply() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only");
    cage.plan("A to B", "f.txt", "A", "B").unwrap();

    OpenOptions::new()
        .write(true)
        .open(&cage.config().trail_log_path)
        .unwrap()
        .set_len(0)
        .unwrap();

    let err = cage.apply().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CageError::Audit(_)));
    assert_eq!(room.read_workspace_file("f.txt"), "A only");

    // the trail stays broken
    assert!(cage.trail().append(EntryKind::Plan, json!({})).is_err());
}

#[test]
fn test_trail_hashes_verify_after_a_run() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only");
    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    cage.apply().unwrap();

    let report = cage.trail().verify_hashes().unwrap();
    assert!(report.valid());
    assert_eq!(report.entries_checked, 5);
}

#[test]
fn test_session_flags_are_clear_after_apply() {
    let room = TempRoom::new();
    let cage = ready(&room, "A only").with_postcondition(AlwaysFail);
    cage.plan("A to B", "f.txt", "A", "B").unwrap();
    cage.apply().unwrap();

    let flags = cage.session().flags();
    assert!(flags.rehydrated);
    assert!(!flags.diff_mode_active);
    assert!(!flags.bootstrap_mode);
}
