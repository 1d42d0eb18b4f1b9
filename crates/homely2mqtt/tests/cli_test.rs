//! Integration tests for the `homely2mqtt` binary.
//!
//! These tests cover argument parsing, config rendering and startup
//! failures, all without a Homely account or an MQTT broker.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the binary with env isolation.
///
/// Clears every variable the binary reads and points config directories at
/// a nonexistent path so tests never touch the user's real configuration.
fn homely2mqtt_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("homely2mqtt");
    cmd.env("HOME", "/tmp/homely2mqtt-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/homely2mqtt-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("HOMELY_USERNAME")
        .env_remove("HOMELY_PASSWORD")
        .env_remove("HOMELY_BASE_URL")
        .env_remove("MQTT_HOST")
        .env_remove("MQTT_PORT")
        .env_remove("MQTT_TOPIC_ROOT")
        .env_remove("HOMELY2MQTT_CONFIG")
        .env_remove("HOMELY2MQTT_MALFORMED")
        .env_remove("HOMELY2MQTT_LOG_FORMAT")
        .env_remove("HOMELY2MQTT_LOG_FILE");
    cmd
}

fn config_file(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    homely2mqtt_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Homely")
            .and(predicate::str::contains("--mqtt-host"))
            .and(predicate::str::contains("--topic-root")),
    );
}

#[test]
fn test_version_flag() {
    homely2mqtt_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("homely2mqtt"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    homely2mqtt_cmd()
        .arg("--no-such-flag")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--no-such-flag"));
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_config_command_shows_defaults() {
    homely2mqtt_cmd().arg("config").assert().success().stdout(
        predicate::str::contains("homely2mqtt_client")
            .and(predicate::str::contains("https://sdk.iotiliti.cloud"))
            .and(predicate::str::contains("heartbeat_interval = \"30s\"")),
    );
}

#[test]
fn test_config_command_layers_file_and_flags() {
    let file = config_file(
        r#"
[homely]
username = "ola@example.com"
password = "hunter2"

[mqtt]
host = "broker.lan"
port = 8883
"#,
    );

    homely2mqtt_cmd()
        .arg("--config")
        .arg(file.path())
        .args(["--mqtt-host", "10.0.0.2", "config"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("host = \"10.0.0.2\"")
                .and(predicate::str::contains("port = 8883"))
                .and(predicate::str::contains("ola@example.com"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_malformed_config_file_exits_with_config_code() {
    let file = config_file("[mqtt]\nport = \"not a number\"\n");

    homely2mqtt_cmd()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .assert()
        .code(2);
}

// ── Startup failures ────────────────────────────────────────────────

#[test]
fn test_missing_credentials_exits_with_auth_code() {
    homely2mqtt_cmd()
        .arg("run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No Homely user name configured"));
}

#[test]
fn test_invalid_duration_exits_with_config_code() {
    let file = config_file(
        r#"
[homely]
username = "ola@example.com"
password = "hunter2"

[bridge]
heartbeat_interval = "0s"
"#,
    );

    homely2mqtt_cmd()
        .arg("--config")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("bridge.heartbeat_interval"));
}
