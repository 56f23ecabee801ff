//! End-to-end CLI tests for the gridstage binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with an isolated config directory so user settings never leak in.
fn gridstage(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gridstage").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

// ==================== General Tests ====================

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bringonline"))
        .stdout(predicate::str::contains("copy"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let home = TempDir::new().unwrap();
    gridstage(&home).assert().failure();
}

#[test]
fn test_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_version_lists_mock_plugin() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gridstage"))
        .stdout(predicate::str::contains("mock-"));
}

#[test]
fn test_version_json() {
    let home = TempDir::new().unwrap();
    let output = gridstage(&home)
        .args(["--json", "version"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    assert!(value["plugins"].as_array().unwrap().len() == 1);
}

// ==================== Bring-Online Tests ====================

#[test]
fn test_bringonline_all_ready_exits_zero() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["bringonline", "mock://host/a", "mock://host/b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Token: mock-"))
        .stdout(predicate::str::contains("OK     mock://host/a"))
        .stdout(predicate::str::contains("OK     mock://host/b"));
}

#[test]
fn test_bringonline_mixed_batch_is_partial() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args([
            "bringonline",
            "mock://host/a",
            "mock://host/b?staging_errno=2",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("OK     mock://host/a"))
        .stdout(predicate::str::contains("FAILED mock://host/b?staging_errno=2"));
}

#[test]
fn test_bringonline_all_failed_exits_one() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["bringonline", "srm://host/a"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAILED srm://host/a"));
}

#[test]
fn test_bringonline_without_poll_reports_queued() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["bringonline", "mock://host/slow?staging_time=60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QUEUED mock://host/slow"));
}

#[test]
fn test_bringonline_poll_waits_for_settlement() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("fast.toml");
    fs::write(&config, "poll_initial_delay_secs = 1\npoll_max_delay_secs = 2\n").unwrap();

    gridstage(&home)
        .arg("--config")
        .arg(&config)
        .args(["bringonline", "--poll", "mock://host/a?staging_time=0.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QUEUED mock://host/a"))
        .stdout(predicate::str::contains("OK     mock://host/a"));
}

#[test]
fn test_bringonline_json_report() {
    let home = TempDir::new().unwrap();
    let output = gridstage(&home)
        .args([
            "--json",
            "bringonline",
            "mock://host/a",
            "mock://host/b?staging_errno=13",
        ])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(value["token"].as_str().unwrap().starts_with("mock-"));
    assert_eq!(value["results"][0]["state"], "ready");
    assert_eq!(value["results"][1]["state"], "failed");
    assert_eq!(value["results"][1]["code"], 13);
    assert_eq!(value["summary"]["failed"], 1);
}

#[test]
fn test_bringonline_rejects_out_of_range_pin_lifetime() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["bringonline", "--pin-lifetime", "0", "mock://host/a"])
        .assert()
        .failure();
}

// ==================== Copy Tests ====================

#[test]
fn test_copy_succeeds() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["-q", "copy", "mock://host/src", "mock://host/dst"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK     mock://host/src => mock://host/dst"));
}

#[test]
fn test_copy_source_checksum_mismatch_fails() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args([
            "-q",
            "copy",
            "-K",
            "--checksum-value",
            "bad",
            "mock://host/src",
            "mock://host/dst",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("transfer.checksum.source"));
}

#[test]
fn test_copy_missing_parent_fails_without_flag() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["-q", "copy", "mock://host/src", "mock://host/dir/dst"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to copy the file"));

    gridstage(&home)
        .args(["-q", "copy", "-p", "mock://host/src", "mock://host/dir/dst"])
        .assert()
        .success();
}

#[test]
fn test_copy_checksum_value_requires_checksum_flag() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args([
            "copy",
            "--checksum-value",
            "abc",
            "mock://host/src",
            "mock://host/dst",
        ])
        .assert()
        .failure();
}

// ==================== Config Tests ====================

#[test]
fn test_invalid_config_file_fails() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("gridstage");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), "unknown_key = 1\n").unwrap();

    gridstage(&home)
        .arg("version")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["--config", "/nonexistent/gridstage.toml", "version"])
        .assert()
        .code(1);
}

// ==================== Extreme Value Tests ====================

#[test]
fn test_copy_with_maximum_timeout_succeeds() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args([
            "-q",
            "copy",
            "--timeout",
            "18446744073709551615",
            "mock://host/src",
            "mock://host/dst",
        ])
        .assert()
        .success();
}

#[test]
fn test_bringonline_unrepresentable_staging_time_fails_url() {
    let home = TempDir::new().unwrap();
    gridstage(&home)
        .args(["bringonline", "mock://host/a?staging_time=1e19"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAILED mock://host/a?staging_time=1e19"));
}
