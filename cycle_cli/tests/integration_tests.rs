//! Integration tests for the repcycle binary.
//!
//! These tests verify end-to-end behavior including:
//! - Cycle start, marking and auto-completion
//! - Reset and history
//! - Set logging, statistics and export
//! - Legacy completion mark migration

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Short daily cycles so a full cycle fits in a test
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        "[cycle]\nlength_days = 6\nfrequency = \"daily\"\nexercises_per_slot = 2\n",
    )
    .expect("Failed to write config");
    path
}

/// Helper to get the CLI binary, pointed at `dir` for user alice
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("repcycle"));
    cmd.arg("--data-dir")
        .arg(dir)
        .arg("--config")
        .arg(write_config(dir))
        .arg("--user")
        .arg("alice");
    cmd
}

fn user_dir(dir: &Path) -> PathBuf {
    dir.join("users").join("alice")
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("repcycle"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Training cycle planner and progress tracker",
        ));
}

#[test]
fn test_start_creates_cycle_and_plan() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["start", "--date", "2024-03-04"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started cycle 1 on 2024-03-04"))
        .stdout(predicate::str::contains("6 workout days planned"))
        .stdout(predicate::str::contains("Chest & Back: Bench Press, Bent-Over Row"));

    assert!(user_dir(temp_dir.path()).join("cycle.json").exists());
    assert!(user_dir(temp_dir.path()).join("plan.json").exists());

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cycle 1"))
        .stdout(predicate::str::contains("Days completed: 0/6"));
}

#[test]
fn test_second_start_fails_while_active() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path()).arg("start").assert().success();

    cli(temp_dir.path())
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already active"));
}

#[test]
fn test_mark_without_cycle_fails() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["mark", "--day", "0", "--exercise", "Squat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active cycle"));
}

#[test]
fn test_mark_outside_plan_fails() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path()).arg("start").assert().success();

    cli(temp_dir.path())
        .args(["mark", "--day", "6", "--exercise", "Squat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the plan"));
}

#[test]
fn test_plan_shows_marks() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path()).arg("start").assert().success();

    cli(temp_dir.path())
        .args(["mark", "--day", "1", "--exercise", "Squat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Days completed: 1"));

    cli(temp_dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Legs & Glutes"))
        .stdout(predicate::str::contains("[x] Squat"))
        .stdout(predicate::str::contains("[ ] Romanian Deadlift"));

    cli(temp_dir.path())
        .args(["mark", "--day", "1", "--exercise", "Squat", "--undo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unmarked Squat on day 1"));

    cli(temp_dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("[ ] Squat"));
}

#[test]
fn test_full_cycle_completes_and_archives() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .args(["start", "--date", "2024-03-04"])
        .assert()
        .success();

    for day in 0..5 {
        cli(temp_dir.path())
            .args(["mark", "--day", &day.to_string(), "--exercise", "Squat"])
            .assert()
            .success()
            .stdout(predicate::str::contains("complete!").not());
    }

    cli(temp_dir.path())
        .args(["mark", "--day", "5", "--exercise", "Squat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cycle 1 complete! 6 days trained."));

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active cycle for alice."));

    cli(temp_dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cycle 1: 2024-03-04"))
        .stdout(predicate::str::contains("(6 days)"));

    // the next cycle rotates in exercises that were skipped
    cli(temp_dir.path())
        .arg("start")
        .assert()
        .success()
        .stdout(predicate::str::contains("Started cycle 2"))
        .stdout(predicate::str::contains("Chest & Back: Push-up, Pull-up"));
}

#[test]
fn test_reset_discards_cycle() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path()).arg("start").assert().success();
    cli(temp_dir.path())
        .args(["mark", "--day", "0", "--exercise", "Bench Press"])
        .assert()
        .success();

    cli(temp_dir.path())
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset cycle 1"));

    cli(temp_dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No completed cycles yet."));

    assert!(!user_dir(temp_dir.path()).join("completions.json").exists());

    cli(temp_dir.path())
        .arg("start")
        .assert()
        .success()
        .stdout(predicate::str::contains("Started cycle 2"));
}

#[test]
fn test_log_and_stats() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["log", "--exercise", "Squat", "--weight", "100", "--reps", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged Squat x 5 @ 100 (500 volume)"));

    cli(temp_dir.path())
        .args(["log", "--exercise", "Bench Press", "--weight", "60", "--reps", "10", "--set", "2", "--sets", "3"])
        .assert()
        .success();

    cli(temp_dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total volume: 1100.0"))
        .stdout(predicate::str::contains("Quads"))
        .stdout(predicate::str::contains("Bench Press"))
        .stdout(predicate::str::contains("Daily volume:"))
        .stdout(predicate::str::contains("    1100.0"));

    cli(temp_dir.path())
        .arg("insights")
        .assert()
        .success()
        .stdout(predicate::str::contains("Most trained: Chest (600 total volume)"))
        .stdout(predicate::str::contains("Needs attention: Core has never been trained"));
}

#[test]
fn test_log_rejects_negative_weight() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["log", "--exercise", "Squat", "--weight=-5", "--reps", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("non-negative"));
}

#[test]
fn test_body_trend() {
    let temp_dir = setup_test_dir();

    for value in ["82", "80"] {
        cli(temp_dir.path())
            .args(["body", "--parameter", "weight", "--value", value])
            .assert()
            .success();
    }

    cli(temp_dir.path())
        .args(["trend", "--parameter", "weight"])
        .assert()
        .success()
        .stdout(predicate::str::contains("weight: 82 -> 80 (-2) over 2 readings"));

    cli(temp_dir.path())
        .args(["trend", "--parameter", "waist"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No waist measurements recorded."));
}

#[test]
fn test_stats_for_new_user_shows_zero_volume() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total volume: 0.0"))
        .stdout(predicate::str::contains("-0.0").not())
        .stdout(predicate::str::contains("Daily volume:").not());
}

#[test]
fn test_schedule_rejects_oversized_day_count() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["schedule", "--start", "2024-01-01", "--days", "99999999999999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("panicked").not());

    cli(temp_dir.path())
        .args(["schedule", "--start", "2024-01-01", "--days", "3651"])
        .assert()
        .failure();
}

#[test]
fn test_schedule_three_per_week() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["schedule", "--start", "2024-03-04", "--frequency", "3x/week", "--days", "6"])
        .assert()
        .success()
        .stdout("2024-03-04\n2024-03-06\n2024-03-08\n2024-03-11\n2024-03-13\n2024-03-15\n");
}

#[test]
fn test_export_csv() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .args(["log", "--exercise", "Squat", "--weight", "100", "--reps", "5"])
        .assert()
        .success();

    let out = temp_dir.path().join("export").join("sets.csv");
    cli(temp_dir.path())
        .arg("export")
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 sets"));

    let content = fs::read_to_string(&out).expect("Failed to read CSV");
    assert!(content.starts_with("id,exercise_name,date,weight,reps,volume"));
    assert!(content.contains(",Squat,"));
}

#[test]
fn test_migrate_legacy_marks() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path()).arg("start").assert().success();

    // marks written before day indices existed
    let dir = user_dir(temp_dir.path());
    fs::write(dir.join("completions.json"), r#"["alice_Squat","Bench Press"]"#).unwrap();
    fs::remove_file(dir.join("meta.json")).unwrap();

    cli(temp_dir.path())
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated 2 completion marks"));

    let markers: Vec<String> =
        serde_json::from_str(&fs::read_to_string(dir.join("completions.json")).unwrap()).unwrap();
    assert_eq!(markers, vec!["0_Bench Press", "1_Squat"]);

    cli(temp_dir.path())
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated 0 completion marks"));

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cycle 1"));
}

#[test]
fn test_users_are_isolated() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path()).arg("start").assert().success();

    let mut bob = Command::new(assert_cmd::cargo::cargo_bin!("repcycle"));
    bob.arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--config")
        .arg(write_config(temp_dir.path()))
        .arg("--user")
        .arg("bob")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active cycle for bob."));
}
