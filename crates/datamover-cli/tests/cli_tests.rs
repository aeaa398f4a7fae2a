//! CLI integration tests for datamover.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that never reach a database.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the datamover binary.
fn cmd() -> Command {
    Command::cargo_bin("datamover").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--type"))
        .stdout(predicate::str::contains("--control_host"))
        .stdout(predicate::str::contains("--control_db"))
        .stdout(predicate::str::contains("--dest_host"))
        .stdout(predicate::str::contains("--dest_db"))
        .stdout(predicate::str::contains("--temp_location"))
        .stdout(predicate::str::contains("--nct"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--bucket"));
}

#[test]
fn test_help_shows_dest_aliases() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("aliases: h2"))
        .stdout(predicate::str::contains("aliases: d2"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("datamover"));
}

#[test]
fn test_defaults_in_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: v1_standard]"))
        .stdout(predicate::str::contains("[default: network]"))
        .stdout(predicate::str::contains("[default: 5432]"));
}

// =============================================================================
// Error Condition Tests
// =============================================================================

#[test]
fn test_missing_required_args_fails() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--type"));
}

#[test]
fn test_unknown_operation_type_exits_2() {
    cmd()
        .args([
            "--type",
            "drop_everything",
            "--control_host",
            "localhost",
            "--control_db",
            "control",
        ])
        .env("DATA_MOVER_SECRET", "test-secret")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unsupported operation type"));
}

#[test]
fn test_missing_secret_exits_2() {
    cmd()
        .args([
            "--type",
            "structure_backup",
            "--control_host",
            "localhost",
            "--control_db",
            "control",
            "--bucket",
            "backups",
        ])
        .env_remove("DATA_MOVER_SECRET")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("DATA_MOVER_SECRET"));
}

#[test]
fn test_missing_destination_exits_2() {
    cmd()
        .args([
            "--type",
            "staging_to_process",
            "--control_host",
            "localhost",
            "--control_db",
            "staging",
        ])
        .env("DATA_MOVER_SECRET", "test-secret")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("destination"));
}

#[test]
fn test_backup_without_bucket_exits_2() {
    cmd()
        .args([
            "--type",
            "backup_runner",
            "--control_host",
            "localhost",
            "--control_db",
            "runner_1",
        ])
        .env("DATA_MOVER_SECRET", "test-secret")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--bucket"));
}

#[test]
fn test_invalid_temp_location_exits_2() {
    cmd()
        .args([
            "--type",
            "backup_runner",
            "--control_host",
            "localhost",
            "--control_db",
            "runner_1",
            "--temp_location",
            "ramdisk",
        ])
        .env("DATA_MOVER_SECRET", "test-secret")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("temp_location"));
}

#[test]
fn test_zero_workers_exits_2() {
    cmd()
        .args([
            "--type",
            "staging_to_process",
            "--control_host",
            "localhost",
            "--control_db",
            "staging",
            "--dest_db",
            "process",
            "--workers",
            "0",
        ])
        .env("DATA_MOVER_SECRET", "test-secret")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("workers"));
}
