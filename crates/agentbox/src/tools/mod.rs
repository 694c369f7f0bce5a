//! Tool adapters.
//!
//! Each tool maps external call parameters onto an [`InvocationRequest`] for
//! one agent CLI: it builds the argument vector, chooses the stream
//! protocol, and decides the retry policy. Execution itself belongs to the
//! engine.

mod claude;
mod coder;
mod codex;
mod gemini;

use crate::config::{self, Config, ConfigError};
use crate::engine::{self, ToolRun};
use crate::model::{
    ErrorKind, InvocationRequest, Outcome, ResponseOptions, RetryPolicy, SandboxMode,
    DEFAULT_IDLE_TIMEOUT_S, DEFAULT_MAX_DURATION_S,
};
use crate::protocol::{AgentProtocol, ClaudeStream, CodexExec, GeminiStream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Claude,
    Coder,
    Codex,
    Gemini,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: &'static str, message: String },
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [Self::Claude, Self::Coder, Self::Codex, Self::Gemini];

    pub fn name(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Coder => "coder",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ToolError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Claude => claude::DESCRIPTION,
            Self::Coder => coder::DESCRIPTION,
            Self::Codex => codex::DESCRIPTION,
            Self::Gemini => gemini::DESCRIPTION,
        }
    }

    pub fn default_sandbox(self) -> SandboxMode {
        match self {
            Self::Codex => SandboxMode::ReadOnly,
            Self::Claude | Self::Coder | Self::Gemini => SandboxMode::WorkspaceWrite,
        }
    }

    /// Tools with write side effects are not retried unless asked to.
    pub fn default_max_retries(self) -> u32 {
        match self {
            Self::Claude | Self::Coder => 0,
            Self::Codex | Self::Gemini => 1,
        }
    }

    pub fn protocol(self) -> &'static dyn AgentProtocol {
        match self {
            Self::Claude | Self::Coder => &ClaudeStream,
            Self::Codex => &CodexExec,
            Self::Gemini => &GeminiStream,
        }
    }

    /// Full argument vector for a call, `argv[0]` being the agent command.
    pub fn argv(self, params: &ToolParams) -> Vec<String> {
        let sandbox = params.sandbox_or(self);
        match self {
            Self::Claude => claude::argv(params, sandbox),
            Self::Coder => coder::argv(params, sandbox),
            Self::Codex => codex::argv(params, sandbox),
            Self::Gemini => gemini::argv(params, sandbox),
        }
    }

    /// JSON schema of the call arguments.
    pub fn input_schema(self) -> Value {
        let mut properties = json!({
            "PROMPT": {"type": "string", "description": "Instructions for the agent"},
            "cd": {"type": "string", "description": "Working directory for the agent"},
            "sandbox": {
                "type": "string",
                "enum": ["read-only", "workspace-write", "danger-full-access"],
                "default": self.default_sandbox().as_str(),
                "description": "Filesystem access granted to the agent"
            },
            "SESSION_ID": {"type": "string", "default": "", "description": "Resume an earlier session"},
            "return_all_messages": {"type": "boolean", "default": false, "description": "Include every stream message in the result"},
            "return_metrics": {"type": "boolean", "default": false, "description": "Include the metrics record in the result"},
            "timeout": {"type": "integer", "minimum": 1, "default": DEFAULT_IDLE_TIMEOUT_S, "description": "Idle timeout in seconds: no output for this long ends the run"},
            "max_duration": {"type": "integer", "minimum": 0, "default": DEFAULT_MAX_DURATION_S, "description": "Wall-clock limit in seconds, 0 for none"},
            "max_retries": {"type": "integer", "minimum": 0, "default": self.default_max_retries(), "description": "Extra attempts after a failure"},
            "log_metrics": {"type": "boolean", "default": false, "description": "Write the metrics record to stderr"}
        });
        let extra = match self {
            Self::Codex => json!({
                "skip_git_repo_check": {"type": "boolean", "default": true, "description": "Allow running outside a git repository"},
                "image": {"type": "array", "items": {"type": "string"}, "description": "Image files to attach"},
                "model": {"type": "string", "default": "", "description": "Model override"},
                "yolo": {"type": "boolean", "default": false, "description": "Run every command without approval or sandbox"},
                "profile": {"type": "string", "default": "", "description": "Profile from ~/.codex/config.toml"}
            }),
            Self::Gemini => json!({
                "yolo": {"type": "boolean", "default": true, "description": "Run every command without approval"},
                "model": {"type": "string", "default": "", "description": "Model override"}
            }),
            Self::Claude | Self::Coder => json!({}),
        };
        if let (Some(base), Value::Object(extra)) = (properties.as_object_mut(), extra) {
            base.extend(extra);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["PROMPT", "cd"]
        })
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Call parameters, using the external argument names.
///
/// Tool-specific fields are ignored by tools that do not use them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ToolParams {
    #[serde(rename = "PROMPT")]
    pub prompt: String,
    pub cd: PathBuf,
    #[serde(default)]
    pub sandbox: Option<SandboxMode>,
    #[serde(rename = "SESSION_ID", default)]
    pub session_id: String,
    #[serde(default)]
    pub return_all_messages: bool,
    #[serde(default)]
    pub return_metrics: bool,
    #[serde(default)]
    pub log_metrics: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub max_duration: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub image: Vec<PathBuf>,
    #[serde(default)]
    pub yolo: Option<bool>,
    #[serde(default)]
    pub skip_git_repo_check: Option<bool>,
}

impl ToolParams {
    pub fn new(prompt: impl Into<String>, cd: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            cd: cd.into(),
            ..Self::default()
        }
    }

    /// Decode and validate call arguments for `kind`.
    pub fn from_value(kind: ToolKind, arguments: Value) -> Result<Self, ToolError> {
        let invalid = |message: String| ToolError::InvalidArguments {
            tool: kind.name(),
            message,
        };
        let params: Self = serde_json::from_value(arguments).map_err(|err| invalid(err.to_string()))?;
        if params.timeout == Some(0) {
            return Err(invalid("timeout must be at least 1 second".to_string()));
        }
        Ok(params)
    }

    pub fn sandbox_or(&self, kind: ToolKind) -> SandboxMode {
        self.sandbox.unwrap_or_else(|| kind.default_sandbox())
    }

    /// `SESSION_ID`, when one was given.
    pub fn session(&self) -> Option<&str> {
        Some(self.session_id.trim()).filter(|id| !id.is_empty())
    }

    /// The prompt with CRLF and lone CR line endings turned into LF.
    pub fn normalized_prompt(&self) -> String {
        self.prompt.replace("\r\n", "\n").replace('\r', "\n")
    }

    pub fn response_options(&self) -> ResponseOptions {
        ResponseOptions {
            return_all_messages: self.return_all_messages,
            return_metrics: self.return_metrics,
            log_metrics: self.log_metrics,
        }
    }
}

/// Run a tool call with configuration from the standard location.
pub fn run_tool(kind: ToolKind, params: &ToolParams) -> Outcome {
    run_tool_with_config(kind, params, config::load_config())
}

/// Run a tool call. Configuration problems become `config_error` outcomes.
pub fn run_tool_with_config(
    kind: ToolKind,
    params: &ToolParams,
    config: Result<Config, ConfigError>,
) -> Outcome {
    let sandbox = params.sandbox_or(kind);
    let prompt = params.normalized_prompt();
    let run = ToolRun {
        tool: kind.name(),
        sandbox,
        protocol: kind.protocol(),
        options: params.response_options(),
    };

    let env = match config.and_then(|config| config::build_env(kind, &config, std::env::vars())) {
        Ok(env) => env,
        Err(err) => {
            return engine::reject(&run, &prompt, ErrorKind::ConfigError, format!("configuration error: {err}"));
        }
    };
    if !params.cd.is_dir() {
        let message = format!("working directory {} does not exist", params.cd.display());
        return engine::reject(&run, &prompt, ErrorKind::ConfigError, message);
    }

    let retry = RetryPolicy::new(params.max_retries.unwrap_or_else(|| kind.default_max_retries()))
        // Timeouts are only retried when the agent could not have written anything.
        .with_timeout_retries(sandbox.is_read_only());
    let request = InvocationRequest::new(kind.argv(params), params.cd.clone())
        .with_env(env)
        .with_input(prompt)
        .with_timeouts_secs(
            params.timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT_S),
            params.max_duration.unwrap_or(DEFAULT_MAX_DURATION_S),
        )
        .with_retry(retry);
    debug!(tool = kind.name(), %sandbox, cwd = %params.cd.display(), "running tool");
    engine::invoke(&run, &request)
}
