//! Integration tests for the archfix CLI
//!
//! These tests run the actual binary against throwaway Python projects to
//! verify:
//! - `scan --json` emits a parseable analysis and records history
//! - `plan` writes the patch plan and the optional action plan
//! - `apply` gates, applies, verifies and rolls back
//! - `rollback`, `backups` and `learning` read the state apply leaves behind
//!
//! Each test uses its own temp directory so state never leaks between tests.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn archfix_bin() -> String {
    env!("CARGO_BIN_EXE_archfix").to_string()
}

/// Project with a two-module import cycle
fn cycle_project() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("a.py"),
        "import b\n\n\ndef fa():\n    return b.fb\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.py"),
        "import a\n\n\ndef fb():\n    return a.fa\n",
    )
    .unwrap();
    dir
}

/// Run archfix and return (stdout, stderr, exit_code)
fn run(args: &[&str], path: &Path) -> (String, String, i32) {
    let output = Command::new(archfix_bin())
        .args(args)
        .arg(path)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute archfix binary");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("Invalid JSON ({}): {}", e, stdout))
}

// ============================================================================
// scan
// ============================================================================

#[test]
fn test_scan_json_reports_cycle() {
    let dir = cycle_project();
    let (stdout, stderr, code) = run(&["scan", "--json"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);

    let json = parse_json(&stdout);
    assert_eq!(json["graph"]["nodes"], 2);
    let smells = json["smells"].as_array().unwrap();
    assert!(smells.iter().any(|s| s["type"] == "cyclic_dependency"));
    assert!(json["health"]["score"].as_i64().unwrap() <= 100);
    assert!(dir.path().join(".archfix/history.json").exists());
}

#[test]
fn test_scan_no_history_leaves_no_state() {
    let dir = cycle_project();
    let (_, stderr, code) = run(&["scan", "--json", "--no-history"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(!dir.path().join(".archfix").exists());
}

#[test]
fn test_default_command_is_scan() {
    let dir = cycle_project();
    let (stdout, stderr, code) = run(&[], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("archfix scan"));
    assert!(stdout.contains("cyclic_dependency"));
}

#[test]
fn test_missing_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run(&["scan"], &dir.path().join("nope"));
    assert_ne!(code, 0);
    assert!(stderr.contains("Path does not exist"));
}

// ============================================================================
// plan
// ============================================================================

#[test]
fn test_plan_writes_plan_and_action_plan() {
    let dir = cycle_project();
    let actions = dir.path().join("actions.json");
    let (_, stderr, code) = run(
        &["plan", "--action-plan", actions.to_str().unwrap()],
        dir.path(),
    );
    assert_eq!(code, 0, "stderr: {}", stderr);

    let plan_path = dir.path().join(".archfix/patch_plan.json");
    let plan = parse_json(&std::fs::read_to_string(plan_path).unwrap());
    let ops = plan["operations"].as_array().unwrap();
    assert!(ops.iter().any(|o| o["kind"] == "remove_cyclic_import"));

    let bundle = parse_json(&std::fs::read_to_string(actions).unwrap());
    assert!(bundle["architecture_plan"]["steps"].is_array());
    assert!(bundle["action_plan"]["actions"].is_array());
}

// ============================================================================
// apply / rollback / backups / learning
// ============================================================================

#[test]
fn test_apply_dry_run_changes_nothing() {
    let dir = cycle_project();
    let before_a = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
    let (stdout, stderr, code) = run(&["apply", "--dry-run", "--json"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);

    let json = parse_json(&stdout);
    assert_eq!(json["mode"], "assist");
    assert_eq!(json["report"]["dry_run"], true);
    assert!(!json["policy"]["decisions"].as_array().unwrap().is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
        before_a
    );
    assert!(!dir.path().join(".archfix_backups").exists());
    assert!(!dir.path().join(".archfix/learning.jsonl").exists());
}

#[test]
fn test_apply_failing_verify_rolls_back_and_learns() {
    let dir = cycle_project();
    let before_a = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
    let before_b = std::fs::read_to_string(dir.path().join("b.py")).unwrap();

    let (stdout, _, code) = run(
        &["apply", "--json", "--verify-cmd", "sh -c false"],
        dir.path(),
    );
    assert_eq!(code, 1);
    let json = parse_json(&stdout);
    assert_eq!(json["report"]["verify"]["success"], false);
    assert_eq!(json["report"]["rollback"]["done"], true);
    assert_eq!(json["report"]["state"], "rolled_back");

    assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), before_a);
    assert_eq!(std::fs::read_to_string(dir.path().join("b.py")).unwrap(), before_b);

    let learning = std::fs::read_to_string(dir.path().join(".archfix/learning.jsonl")).unwrap();
    assert_eq!(learning.lines().count(), 1);
    assert!(dir.path().join(".archfix/session_memory.json").exists());

    let (stdout, stderr, code) = run(&["learning", "--json"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);
    let stats = parse_json(&stdout);
    assert_eq!(stats["records"], 1);
    assert_eq!(stats["telemetry"]["rollback_rate"], 1.0);

    let (stdout, _, code) = run(&["backups"], dir.path());
    assert_eq!(code, 0);
    assert!(stdout.contains("(latest)"));
}

#[test]
fn test_apply_then_manual_rollback() {
    let dir = cycle_project();
    let before_a = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
    let before_b = std::fs::read_to_string(dir.path().join("b.py")).unwrap();

    let (stdout, stderr, code) = run(&["apply", "--json", "--verify-cmd", "sh -c true"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);
    let json = parse_json(&stdout);
    assert!(!json["report"]["modified"].as_array().unwrap().is_empty());
    assert_eq!(json["report"]["state"], "done");

    let (stdout, stderr, code) = run(&["rollback", "--json"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);
    let report = parse_json(&stdout);
    assert!(!report["restored"].as_array().unwrap().is_empty());
    assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), before_a);
    assert_eq!(std::fs::read_to_string(dir.path().join("b.py")).unwrap(), before_b);
}

#[test]
fn test_rejected_operation_is_skipped_next_run() {
    let dir = cycle_project();
    let (_, stderr, code) = run(&["plan"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);

    let (stdout, _, code) = run(&["apply", "--dry-run", "--json"], dir.path());
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    let first = json["policy"]["kept"][0].clone();
    let key = format!(
        "{}|{}|{}",
        first["target_file"].as_str().unwrap(),
        first["kind"].as_str().unwrap(),
        first["params"]["location"].as_str().unwrap_or("")
    );

    let (stdout, _, code) = run(&["apply", "--dry-run", "--json", "--reject", &key], dir.path());
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    assert_eq!(json["policy"]["decision_summary"]["blocked_by_human"], 1);

    // remembered for the campaign without repeating --reject
    let (stdout, _, _) = run(&["apply", "--dry-run", "--json"], dir.path());
    let json = parse_json(&stdout);
    let skipped = json["policy"]["skipped"].as_array().unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["target_file"], first["target_file"]);

    let (stdout, _, _) = run(&["apply", "--dry-run", "--json", "--ignore-campaign"], dir.path());
    let json = parse_json(&stdout);
    assert!(json["policy"]["skipped"].as_array().unwrap().is_empty());
}

#[test]
fn test_rollback_without_backups_fails() {
    let dir = cycle_project();
    let (stdout, _, code) = run(&["rollback", "--json"], dir.path());
    assert_ne!(code, 0);
    let report = parse_json(&stdout);
    assert!(report["errors"][0]
        .as_str()
        .unwrap()
        .starts_with("Backup dir not found"));
}

#[test]
fn test_learning_whitelist_draft_requires_flag_pairing() {
    let dir = cycle_project();
    let (_, _, code) = run(&["learning", "--allow-auto"], dir.path());
    assert_ne!(code, 0);

    let (_, stderr, code) = run(&["learning", "--whitelist-draft"], dir.path());
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(dir.path().join(".archfix/operation_whitelist.json").exists());
}
