// Test module - relaxed lint rules
#![allow(clippy::default_trait_access)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::inefficient_to_string)]
#![allow(clippy::panic)]
#![allow(clippy::manual_assert)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_possible_truncation)]
#![allow(missing_docs)]

use serde_json::Value;
use std::process::Command;

fn agentbox() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_agentbox"));
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn tools_json_lists_every_tool() {
    let output = agentbox().args(["tools", "--json"]).output().unwrap();
    assert!(output.status.success());

    let tools: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["claude", "coder", "codex", "gemini"]);
    for tool in &tools {
        assert_eq!(tool["inputSchema"]["required"][0], "PROMPT");
    }
}

#[test]
fn tools_text_shows_defaults() {
    let output = agentbox().arg("tools").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("codex"));
    assert!(stdout.contains("read-only"));
}

#[test]
fn completions_generate_for_bash() {
    let output = agentbox().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("agentbox"));
}

#[test]
fn unknown_tool_is_rejected() {
    let output = agentbox()
        .args(["call", "copilot", "--cd", "/tmp", "--prompt", "hi"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown tool"), "stderr: {stderr}");
}

#[test]
fn non_object_args_are_rejected() {
    let output = agentbox()
        .args(["call", "claude", "--cd", "/tmp", "--prompt", "hi", "--args", "[1]"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
