//! Black-box tests of the `fieldagent` binary.
//!
//! Each test gets its own HOME so no real config or key leaks in. Nothing
//! here reaches the network: runs fail before, or against a closed port.

use std::path::Path;
use std::process::{Command, Output};

fn fieldagent(home: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fieldagent"));
    cmd.args(args)
        .env("HOME", home)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("FIELDAGENT_API_KEY")
        .env_remove("FIELDAGENT_MODEL")
        .env_remove("FIELDAGENT_BASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn output(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run fieldagent binary")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn tools_json_lists_mapping_tools() {
    let home = tempfile::tempdir().unwrap();
    let out = output(&mut fieldagent(home.path(), &["tools", "--json"]));
    assert!(out.status.success(), "{}", stderr(&out));

    let defs: Vec<serde_json::Value> = serde_json::from_str(&stdout(&out)).unwrap();
    let names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
    assert_eq!(
        names,
        vec!["calculate_area", "measure_distance", "geocode_address", "capture_screenshot"]
    );
    assert!(defs.iter().all(|d| d["input_schema"]["type"] == "object"));
}

#[test]
fn tools_text_marks_screenshot_tool() {
    let home = tempfile::tempdir().unwrap();
    let out = output(&mut fieldagent(home.path(), &["tools"]));
    assert!(out.status.success());
    assert!(stdout(&out).contains("capture_screenshot [attaches screenshot]"));
}

#[test]
fn config_init_then_show() {
    let home = tempfile::tempdir().unwrap();

    let out = output(&mut fieldagent(home.path(), &["config", "path"]));
    let path = stdout(&out).trim().to_string();
    assert!(path.ends_with("config.toml"));
    assert!(path.starts_with(home.path().to_str().unwrap()));

    let out = output(&mut fieldagent(home.path(), &["config", "init"]));
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(home.path().join(".fieldagent/config.toml").exists());

    let out = output(
        fieldagent(home.path(), &["config", "show"]).env("ANTHROPIC_API_KEY", "sk-ant-secret"),
    );
    assert!(out.status.success());
    let shown = stdout(&out);
    assert!(shown.contains("max_turns = 5"));
    assert!(shown.contains("[REDACTED]"));
    assert!(!shown.contains("sk-ant-secret"));
}

#[test]
fn invalid_config_fails_validation() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join(".fieldagent");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "temperature = 3.0\n").unwrap();

    let out = output(&mut fieldagent(home.path(), &["config", "validate"]));
    assert!(!out.status.success());
    assert!(stdout(&out).contains("temperature"));
}

#[test]
fn run_without_key_explains_setup() {
    let home = tempfile::tempdir().unwrap();
    let out = output(&mut fieldagent(home.path(), &["run", "-m", "How big is this?"]));
    assert!(!out.status.success());
    assert!(stderr(&out).contains("ANTHROPIC_API_KEY"));
}

#[test]
fn run_rejects_malformed_coordinates() {
    let home = tempfile::tempdir().unwrap();
    let out = output(
        fieldagent(home.path(), &["run", "-m", "area?", "--coords", "51.5;0,0"])
            .env("ANTHROPIC_API_KEY", "sk-ant-test"),
    );
    assert!(!out.status.success());
    assert!(stderr(&out).contains("point 1"));
}

#[test]
fn run_json_ends_with_error_chunk_when_api_unreachable() {
    let home = tempfile::tempdir().unwrap();
    let out = output(
        fieldagent(home.path(), &["run", "-m", "hello", "--json"])
            .env("ANTHROPIC_API_KEY", "sk-ant-test")
            .env("FIELDAGENT_BASE_URL", "http://127.0.0.1:9"),
    );
    assert!(!out.status.success());

    let chunks: Vec<serde_json::Value> = stdout(&out)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(chunks.first().unwrap()["type"], "metadata");
    assert_eq!(chunks.last().unwrap()["type"], "error");
    assert!(chunks.iter().all(|c| c["timestamp"].is_string()));
}
