//! Integration tests for the `xenly` CLI binary.
//!
//! Argument parsing, help output, completions and config handling run
//! without a host; the call tests talk to a wiremock JSON-RPC endpoint.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `xenly` binary with env isolation.
///
/// Clears all `XENLY_*` env vars and points the config file into `dir`
/// so tests never touch the user's real configuration.
fn xenly_cmd(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("xenly");
    cmd.env("XENLY_CONFIG", dir.path().join("config.toml"))
        .env("HOME", dir.path())
        .env("NO_COLOR", "1")
        .env_remove("XENLY_PROFILE")
        .env_remove("XENLY_URL")
        .env_remove("XENLY_USERNAME")
        .env_remove("XENLY_PASSWORD")
        .env_remove("XENLY_OUTPUT")
        .env_remove("XENLY_INSECURE")
        .env_remove("XENLY_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, body: &str) {
    std::fs::write(dir.path().join("config.toml"), body).unwrap();
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

struct RpcMethod(&'static str);

impl Match for RpcMethod {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get("method")?.as_str().map(|m| m == self.0))
            .unwrap_or(false)
    }
}

async fn mount(server: &MockServer, name: &'static str, body: Value) {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(RpcMethod(name))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn host() -> MockServer {
    let server = MockServer::start().await;
    mount(
        &server,
        "session.login_with_password",
        json!({"jsonrpc": "2.0", "result": "OpaqueRef:session", "id": 0}),
    )
    .await;
    mount(
        &server,
        "session.logout",
        json!({"jsonrpc": "2.0", "result": "", "id": 0}),
    )
    .await;
    server
}

fn config_path_of(dir: &TempDir) -> String {
    Path::new(dir.path()).join("config.toml").display().to_string()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = TempDir::new().unwrap();
    let output = xenly_cmd(&dir).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir).arg("--help").assert().success().stdout(
        predicate::str::contains("XAPI")
            .and(predicate::str::contains("call"))
            .and(predicate::str::contains("objects"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("network")),
    );
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xenly"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_env() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(config_path_of(&dir)));
}

#[test]
fn test_config_show_no_config() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"default_profile\": \"default\""));
}

#[test]
fn test_config_show_redacts_passwords() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
default_profile = "lab"

[profiles.lab]
url = "https://xcp.lab"
password = "hunter2"
"#,
    );
    xenly_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("https://xcp.lab")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_config_profiles_marks_default() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
default_profile = "prod"

[profiles.lab]
url = "https://xcp.lab"

[profiles.prod]
url = "https://xcp.prod"
"#,
    );
    xenly_cmd(&dir)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::diff("lab\nprod *\n"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let dir = TempDir::new().unwrap();
    let output = xenly_cmd(&dir).arg("foobar").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("foobar"), "Expected error mentioning foobar:\n{text}");
}

#[test]
fn test_objects_without_host() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["objects", "VM"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No host configured"));
}

#[test]
fn test_unknown_profile() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["--profile", "nowhere", "objects", "VM"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere").and(predicate::str::contains("not found")));
}

#[test]
fn test_url_without_password() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["--url", "https://xcp.lab", "call", "VM.get_all"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No credentials"));
}

#[test]
fn test_invalid_output_format() {
    let dir = TempDir::new().unwrap();
    let output = xenly_cmd(&dir)
        .args(["--output", "invalid", "objects", "VM"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_bonded_requires_mode() {
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args(["network", "create", "--name", "storage", "--bonded"])
        .assert()
        .code(2);
}

#[test]
fn test_bond_of_one_rejected_before_login() {
    // Nothing listens on the discard port; validation must fail first.
    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .args([
            "--url",
            "http://127.0.0.1:9",
            "--password",
            "secret",
            "network",
            "create",
            "--name",
            "storage",
            "--bonded",
            "--bond-mode",
            "lacp",
            "--pif",
            "OpaqueRef:e0",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("pifs"));
}

// ── Calls against a mock host ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_call_prints_result() {
    let server = host().await;
    mount(
        &server,
        "VM.get_all",
        json!({"jsonrpc": "2.0", "result": ["OpaqueRef:v1", "OpaqueRef:v2"], "id": 0}),
    )
    .await;

    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .env("XENLY_PASSWORD", "secret")
        .args(["--url", &server.uri(), "-o", "plain", "call", "VM.get_all"])
        .assert()
        .success()
        .stdout(predicate::str::diff("OpaqueRef:v1\nOpaqueRef:v2\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_fault_maps_exit_code() {
    let server = host().await;
    mount(
        &server,
        "VM.get_record",
        json!({
            "jsonrpc": "2.0",
            "error": {"code": 1, "message": "HANDLE_INVALID", "data": ["VM", "OpaqueRef:gone"]},
            "id": 0
        }),
    )
    .await;

    let dir = TempDir::new().unwrap();
    xenly_cmd(&dir)
        .env("XENLY_PASSWORD", "secret")
        .args(["--url", &server.uri(), "call", "VM.get_record", "OpaqueRef:gone"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("HANDLE_INVALID"));
}
