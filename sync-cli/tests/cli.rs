//! Command-line behaviour of the `tally-sync` binary.
//!
//! Only paths that need no live record store are covered here; the engine
//! itself is exercised against the in-memory store in `sync-client`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const PLUGIN_CONFIG: &str = r#"{
    "version": 2,
    "mode": "parent",
    "parentGroupIdField": "group_id",
    "childAppSettings": [
        {"appId": "11", "groupIdFieldCode": "group_id", "mode": "existence",
         "targetFieldCode": "form_a", "contactTargetField": "contact_a"},
        {"appId": "12", "groupIdFieldCode": "group_id", "mode": "copy",
         "copySourceFieldCode": "note", "targetFieldCode": "form_b"}
    ],
    "contactAppId": "30",
    "contactGroupIdField": "group_id"
}"#;

fn settings_toml(store_extra: &str) -> String {
    format!(
        r#"
[store]
base_url = "http://127.0.0.1:9"
timeout_secs = 2
{}

[sync]
parent_collection = "42"
plugin_config = "plugin-config.json"
"#,
        store_extra
    )
}

/// Write a settings file and plugin config into a fresh directory.
fn workspace(settings: &str, plugin_config: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tally-sync.toml");
    std::fs::write(&path, settings).unwrap();
    std::fs::write(dir.path().join("plugin-config.json"), plugin_config).unwrap();
    (dir, path)
}

fn tally_sync(settings: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tally-sync").unwrap();
    cmd.arg("--settings").arg(settings).env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// validate
// ============================================================================

/// A usable configuration prints the rule table and exits successfully.
#[test]
fn validate_prints_rule_table() {
    let (_dir, settings) = workspace(&settings_toml(""), PLUGIN_CONFIG);

    tally_sync(&settings)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Parent:  42 (join: group_id)"))
        .stdout(predicate::str::contains("[2] 12 join group_id copy note -> form_b"))
        .stdout(predicate::str::contains("Contact: 30"))
        .stdout(predicate::str::contains("Configuration OK."));
}

/// validate needs no API token.
#[test]
fn validate_works_without_token() {
    let (_dir, settings) = workspace(&settings_toml(""), PLUGIN_CONFIG);

    tally_sync(&settings).arg("validate").assert().success();
}

/// A configuration without any active rule is rejected, naming the field.
#[test]
fn validate_rejects_config_without_targets() {
    let plugin = PLUGIN_CONFIG
        .replace("\"targetFieldCode\": \"form_a\"", "\"targetFieldCode\": \"\"")
        .replace("\"targetFieldCode\": \"form_b\"", "\"targetFieldCode\": \"\"");
    let (_dir, settings) = workspace(&settings_toml(""), &plugin);

    tally_sync(&settings)
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("childRules"));
}

/// A contact-mode document cannot drive a sync.
#[test]
fn validate_rejects_contact_mode() {
    let plugin = PLUGIN_CONFIG.replace("\"mode\": \"parent\"", "\"mode\": \"contact\"");
    let (_dir, settings) = workspace(&settings_toml(""), &plugin);

    tally_sync(&settings)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("contact"));
}

/// Limits above the store ceilings are rejected before any network call.
#[test]
fn validate_rejects_oversized_page() {
    let toml = format!("{}\n[limits]\npage_size = 1000\n", settings_toml(""));
    let (_dir, settings) = workspace(&toml, PLUGIN_CONFIG);

    tally_sync(&settings)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("page_size"));
}

// ============================================================================
// Settings Errors
// ============================================================================

/// A missing settings file is reported with its path.
#[test]
fn missing_settings_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nowhere.toml");

    tally_sync(&path)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere.toml"));
}

/// A missing plugin config file is reported with its path.
#[test]
fn missing_plugin_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tally-sync.toml");
    std::fs::write(&path, settings_toml("")).unwrap();

    tally_sync(&path)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("plugin-config.json"));
}

/// check refuses to start without an API token.
#[test]
fn check_requires_token() {
    let (_dir, settings) = workspace(&settings_toml(""), PLUGIN_CONFIG);

    tally_sync(&settings)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no api token"));
}

// ============================================================================
// Store Failures
// ============================================================================

/// An unreachable store fails the run with status 1 and writes nothing.
#[test]
fn run_against_unreachable_store_fails() {
    let (_dir, settings) = workspace(&settings_toml("api_token = \"t\""), PLUGIN_CONFIG);

    tally_sync(&settings)
        .arg("run")
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Sync failed"));
}

/// The command list is discoverable.
#[test]
fn help_lists_commands() {
    Command::cargo_bin("tally-sync")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("run"));
}
