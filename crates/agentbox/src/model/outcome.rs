use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Remediation hint attached to idle-timeout failures.
pub const IDLE_TIMEOUT_SUGGESTION: &str = "The agent produced no output for the whole idle window. \
Try: 1) raise the `timeout` parameter 2) check whether the task is stuck 3) split it into smaller subtasks";

/// Remediation hint attached to max-duration failures.
pub const DURATION_TIMEOUT_SUGGESTION: &str = "The agent exceeded its total time budget. \
Try: 1) raise the `max_duration` parameter 2) split it into smaller subtasks 3) check for an endless loop";

/// Fixed taxonomy of invocation failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Max-duration ceiling exceeded.
    Timeout,
    /// No output for the configured idle window.
    IdleTimeout,
    /// Executable could not be resolved. Never retried.
    CommandNotFound,
    /// The agent reported a failure through its own stream protocol.
    UpstreamError,
    /// The agent never announced a session identifier.
    ProtocolMissingSession,
    /// No usable result text and no other error.
    EmptyResult,
    /// Non-zero exit with no more specific cause.
    SubprocessError,
    /// Failure before launch (settings, credentials).
    ConfigError,
    /// Fault while interpreting agent output.
    UnexpectedException,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::IdleTimeout => "idle_timeout",
            Self::CommandNotFound => "command_not_found",
            Self::UpstreamError => "upstream_error",
            Self::ProtocolMissingSession => "protocol_missing_session",
            Self::EmptyResult => "empty_result",
            Self::SubprocessError => "subprocess_error",
            Self::ConfigError => "config_error",
            Self::UnexpectedException => "unexpected_exception",
        }
    }

    pub fn is_timeout(self) -> bool {
        matches!(self, Self::Timeout | Self::IdleTimeout)
    }

    /// Whether a failure of this kind may be followed by another attempt.
    pub fn is_retryable(self, retry_on_timeout: bool) -> bool {
        match self {
            Self::CommandNotFound | Self::ConfigError => false,
            Self::Timeout | Self::IdleTimeout => retry_on_timeout,
            _ => true,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured diagnostic context attached to a failed outcome.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Full error message (the top-level `error` only carries its first line).
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Trailing output lines, oldest first, with large payloads redacted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub json_decode_errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub retries: u32,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach the threshold that fired and the matching remediation hint.
    #[must_use]
    pub fn with_timeout_context(
        mut self,
        kind: ErrorKind,
        idle_timeout: Duration,
        max_duration: Option<Duration>,
    ) -> Self {
        match kind {
            ErrorKind::IdleTimeout => {
                self.idle_timeout_s = Some(idle_timeout.as_secs());
                self.suggestion = Some(IDLE_TIMEOUT_SUGGESTION.to_string());
            }
            ErrorKind::Timeout => {
                self.max_duration_s = max_duration.map(|limit| limit.as_secs());
                self.suggestion = Some(DURATION_TIMEOUT_SUGGESTION.to_string());
            }
            _ => {}
        }
        self
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

/// Terminal value of one tool invocation, after all retries.
///
/// This is the only thing that crosses the external boundary. Absent
/// fields are omitted from the JSON form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub tool: String,
    #[serde(
        rename = "SESSION_ID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// First line of the error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    /// Human-readable wall-clock time, `<minutes>m<seconds>s`.
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_messages: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

impl Outcome {
    pub fn success(
        tool: impl Into<String>,
        session_id: Option<String>,
        result: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            tool: tool.into(),
            session_id,
            result: Some(result),
            error: None,
            error_kind: None,
            error_detail: None,
            duration: format_duration(elapsed),
            all_messages: None,
            metrics: None,
        }
    }

    /// Build a failed outcome. `detail.message` keeps the full text.
    pub fn failure(
        tool: impl Into<String>,
        kind: ErrorKind,
        detail: ErrorDetail,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            tool: tool.into(),
            session_id: None,
            result: None,
            error: Some(first_line(&detail.message).to_string()),
            error_kind: Some(kind),
            error_detail: Some(detail),
            duration: format_duration(elapsed),
            all_messages: None,
            metrics: None,
        }
    }

    /// Serialize to a JSON value; the outcome only holds JSON-safe data.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({
                "success": false,
                "tool": self.tool,
                "error": format!("failed to serialize outcome: {err}"),
                "error_kind": ErrorKind::UnexpectedException,
            })
        })
    }
}

/// Format a duration as `<minutes>m<seconds>s`, truncating sub-second parts.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{}m{}s", total / 60, total % 60)
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}
