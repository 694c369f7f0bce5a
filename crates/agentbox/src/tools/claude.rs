use super::ToolParams;
use crate::model::SandboxMode;

pub(super) const DESCRIPTION: &str = "Consult Claude as a senior technical expert: deep architecture \
advice, complex refactors, and prototypes. Needs write access, so the default sandbox is workspace-write.";

/// Appended to Claude's own system prompt.
pub(super) const SYSTEM_PROMPT: &str = "You are a senior technical expert and consultant. \
Give deep technical insight and architecture advice, carry out complex refactors or prototypes, \
and stay professional, objective and rigorous. Reply with the task result and a short description \
of any changes you made.";

pub(super) fn argv(params: &ToolParams, sandbox: SandboxMode) -> Vec<String> {
    stream_json_argv(params, sandbox, SYSTEM_PROMPT)
}

/// `claude -p` in stream-json mode; the prompt arrives on stdin.
pub(super) fn stream_json_argv(
    params: &ToolParams,
    sandbox: SandboxMode,
    system_prompt: &str,
) -> Vec<String> {
    let mut argv: Vec<String> = [
        "claude",
        "-p",
        "--output-format",
        "stream-json",
        "--verbose",
        "--setting-sources",
        "project",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    if !sandbox.is_read_only() {
        argv.push("--dangerously-skip-permissions".to_string());
    }
    argv.push("--append-system-prompt".to_string());
    argv.push(system_prompt.to_string());
    if let Some(session) = params.session() {
        argv.push("-r".to_string());
        argv.push(session.to_string());
    }
    argv
}
