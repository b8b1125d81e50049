//! CLI integration tests for the Switchboard command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Config and catalog commands read the client config file
//! - Invalid configuration is rejected before any connection is attempted
//!
//! Note: These tests do not require a running server.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
api-version: v1
kind: ClientConfig
current-context: local
contexts:
  - name: local
    server: http://localhost:8080
    tenant-id: acme
    participant-id: alice@example.com
    auth:
      type: none
  - name: prod
    server: https://switchboard.acme.com
    tenant-id: acme
agents:
  - id: invoice-assistant
    display-name: Invoice Assistant
    channel-id: acme:InvoiceWorkflow
    capabilities: [chat, documents]
  - id: helpdesk
    display-name: Helpdesk
    channel-id: acme:Helpdesk
"#;

/// Get a command for the switchboard binary with an isolated environment.
fn switchboard(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("switchboard").unwrap();
    cmd.env("SWITCHBOARD_CONFIG_DIR", config_dir.path())
        .env_remove("SWITCHBOARD_CONTEXT")
        .env_remove("SWITCHBOARD_SERVER_URL")
        .env_remove("SWITCHBOARD_TENANT_ID")
        .env_remove("SWITCHBOARD_API_KEY")
        .env_remove("SWITCHBOARD_PARTICIPANT_ID");
    cmd
}

fn with_config(yaml: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("client.yaml"), yaml).unwrap();
    dir
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Switchboard"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("agents"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("switchboard"));
}

#[test]
fn test_chat_help() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir)
        .args(["chat", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--agent"))
        .stdout(predicate::str::contains("--scope"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir).arg("bogus").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_agents_lists_catalog() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("invoice-assistant"))
        .stdout(predicate::str::contains("acme:Helpdesk"));
}

#[test]
fn test_agents_json() {
    let dir = with_config(CONFIG);
    let output = switchboard(&dir)
        .args(["agents", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let agents: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(agents.as_array().unwrap().len(), 2);
    assert_eq!(agents[0]["channel-id"], "acme:InvoiceWorkflow");
}

#[test]
fn test_agents_without_config() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir)
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("No agents configured"));
}

#[test]
fn test_duplicate_agents_rejected() {
    let dir = with_config(
        r#"
agents:
  - id: a
    display-name: A
    channel-id: ch-a
  - id: a
    display-name: B
    channel-id: ch-b
"#,
    );
    switchboard(&dir)
        .arg("agents")
        .assert()
        .failure()
        .stderr(predicate::str::contains("defined more than once"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_get_contexts() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["config", "get-contexts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local"))
        .stdout(predicate::str::contains("https://switchboard.acme.com"));
}

#[test]
fn test_config_use_context_persists() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["config", "use-context", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switched to context \"prod\""));

    switchboard(&dir)
        .args(["config", "current-context"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prod"));
}

#[test]
fn test_config_use_unknown_context() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["config", "use-context", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_config_show_resolves_settings() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice@example.com"))
        .stdout(predicate::str::contains("history-page-size"));
}

#[test]
fn test_config_show_env_override() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["config", "show"])
        .env("SWITCHBOARD_PARTICIPANT_ID", "bob@example.com")
        .assert()
        .success()
        .stdout(predicate::str::contains("bob@example.com"));
}

#[test]
fn test_config_show_missing_participant() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["--context", "prod", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("participant-id"))
        .stderr(predicate::str::contains("SWITCHBOARD_PARTICIPANT_ID"));
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client.yaml"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat startup validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_chat_unknown_agent_fails_fast() {
    let dir = with_config(CONFIG);
    switchboard(&dir)
        .args(["chat", "--agent", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nobody"));
}

#[test]
fn test_chat_without_server_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(&dir)
        .arg("chat")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SWITCHBOARD_SERVER_URL"));
}
