//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_tls_flags() {
    Command::cargo_bin("rk-server")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--bind"))
        .stdout(predicate::str::contains("--ca"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("rk-server")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_missing_tls_material_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("server.toml");
    std::fs::write(&config, "bind_address = \"127.0.0.1:0\"\n").unwrap();
    Command::cargo_bin("rk-server")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--cert")
        .arg(dir.path().join("missing.pem"))
        .arg("--key")
        .arg(dir.path().join("missing.key"))
        .arg("--ca")
        .arg(dir.path().join("missing-ca.pem"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load TLS material"));
}
