use super::ToolParams;
use crate::model::SandboxMode;

pub(super) const DESCRIPTION: &str = "Hand a sub-task to Gemini: advice, review, or implementing a \
module. Runs with yolo on by default; read-only calls run inside Gemini's sandbox instead. \
Failures are retried once by default.";

/// `gemini` in stream-json mode; the prompt arrives on stdin.
pub(super) fn argv(params: &ToolParams, sandbox: SandboxMode) -> Vec<String> {
    let mut argv: Vec<String> = vec!["gemini".into(), "--output-format".into(), "stream-json".into()];
    if sandbox.is_read_only() {
        argv.push("--sandbox".into());
    } else if params.yolo.unwrap_or(true) {
        argv.push("--yolo".into());
    }
    if !params.model.is_empty() {
        argv.push("-m".into());
        argv.push(params.model.clone());
    }
    if let Some(session) = params.session() {
        argv.push("--resume".into());
        argv.push(session.to_string());
    }
    argv
}
