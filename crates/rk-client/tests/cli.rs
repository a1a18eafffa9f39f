//! Command-line behavior of the rk-client binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_connection_flags() {
    Command::cargo_bin("rk-client")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--server"))
        .stdout(predicate::str::contains("--server-name"))
        .stdout(predicate::str::contains("--cert"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("rk-client")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_unreadable_certificate_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("rk-client")
        .unwrap()
        .arg("--cert")
        .arg(dir.path().join("missing.pem"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read username"));
}
