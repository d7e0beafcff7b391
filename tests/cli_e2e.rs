//! End-to-end CLI tests for the secure-cookie-proxy binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("secure-cookie-proxy").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("account"))
        .stdout(predicate::str::contains("auth"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    cli().assert().failure();
}

#[test]
fn test_account_prints_target_without_scheme() {
    cli()
        .args(["account", "https://www.example.com/app"])
        .assert()
        .success()
        .stdout("www.example.com/app\n");
}

#[test]
fn test_account_rejects_invalid_target() {
    cli()
        .args(["account", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid target"));
}

#[test]
fn test_auth_clear_removes_cookie_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let cookie_file = dir.path().join("www.example.com.txt");
    std::fs::write(&cookie_file, "sid=abc").unwrap();

    cli()
        .args(["auth", "clear", "https://www.example.com", "--backend", "file", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Cleared stored proxy cookies"));

    assert!(!cookie_file.exists());
}

#[test]
fn test_auth_clear_with_account_override() {
    let dir = tempfile::TempDir::new().unwrap();
    let cookie_file = dir.path().join("shared.txt");
    std::fs::write(&cookie_file, "sid=abc").unwrap();

    cli()
        .args([
            "auth",
            "clear",
            "https://www.example.com",
            "--account",
            "shared",
            "--backend",
            "file",
            "--dir",
        ])
        .arg(dir.path())
        .assert()
        .success();

    assert!(!cookie_file.exists());
}

#[test]
fn test_auth_clear_without_stored_cookie_succeeds() {
    let dir = tempfile::TempDir::new().unwrap();

    cli()
        .args(["auth", "clear", "https://www.example.com", "--backend", "file", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No stored proxy cookies found"));
}

#[test]
fn test_quiet_flag_suppresses_info_output() {
    let dir = tempfile::TempDir::new().unwrap();

    cli()
        .args(["-q", "auth", "clear", "https://www.example.com", "--backend", "file", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}
