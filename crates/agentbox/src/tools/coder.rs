use super::claude::stream_json_argv;
use super::ToolParams;
use crate::model::SandboxMode;

pub(super) const DESCRIPTION: &str = "Run code generation or modification tasks on a configurable \
backend model through the claude CLI. Set `coder.base_url` and `coder.api_token` in the config file. \
Needs write access, so the default sandbox is workspace-write and failures are not retried by default.";

pub(super) const SYSTEM_PROMPT: &str = "You are a focused, efficient code execution assistant. \
Carry out the task directly without small talk or clarifying questions, follow good engineering \
practice, and make implementation decisions yourself within the task's scope. Reply with the task \
result and a short description of the changes; include a diff of the key parts when code changed.";

pub(super) fn argv(params: &ToolParams, sandbox: SandboxMode) -> Vec<String> {
    stream_json_argv(params, sandbox, SYSTEM_PROMPT)
}
