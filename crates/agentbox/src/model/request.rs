use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default idle timeout in seconds (no output for this long ends the attempt).
pub const DEFAULT_IDLE_TIMEOUT_S: u64 = 300;
/// Default wall-clock ceiling in seconds. `0` means unbounded.
pub const DEFAULT_MAX_DURATION_S: u64 = 1800;

/// Filesystem access level requested for an agent run.
///
/// The engine never interprets this value; tool adapters translate it into
/// agent-specific command-line flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// The agent may read but not modify the workspace.
    ReadOnly,
    /// The agent may modify files inside the working directory.
    #[default]
    WorkspaceWrite,
    /// No restrictions at all.
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded retry configuration for one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first one.
    pub max_retries: u32,
    /// Whether idle/duration timeouts may be retried. Off unless a tool opts in.
    pub retry_on_timeout: bool,
    /// Backoff unit; attempt `n` sleeps `base_delay * 2^n` before the next try.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_on_timeout: false,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout_retries(mut self, enabled: bool) -> Self {
        self.retry_on_timeout = enabled;
        self
    }
}

/// Immutable description of one agent invocation.
///
/// `argv[0]` is a logical command name resolved against `PATH` at launch.
/// The child sees exactly `env`; nothing is inherited implicitly.
#[derive(Clone, Debug)]
pub struct InvocationRequest {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub input: String,
    pub idle_timeout: Duration,
    /// `None` disables the wall-clock ceiling.
    pub max_duration: Option<Duration>,
    pub retry: RetryPolicy,
}

impl InvocationRequest {
    /// Build a request with default timeouts and no retries.
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            env: BTreeMap::new(),
            cwd: cwd.into(),
            input: String::new(),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_S),
            max_duration: Some(Duration::from_secs(DEFAULT_MAX_DURATION_S)),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Set both timeouts from whole seconds; a zero `max_duration_s` is unbounded.
    #[must_use]
    pub fn with_timeouts_secs(mut self, idle_timeout_s: u64, max_duration_s: u64) -> Self {
        self.idle_timeout = Duration::from_secs(idle_timeout_s);
        self.max_duration = (max_duration_s > 0).then(|| Duration::from_secs(max_duration_s));
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, idle_timeout: Duration, max_duration: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self.max_duration = max_duration.filter(|limit| !limit.is_zero());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Logical command name (`argv[0]`), or an empty string.
    pub fn command_name(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }
}

/// Caller flags shaping what the final outcome carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    /// Include every structured message observed (redacted) in the outcome.
    pub return_all_messages: bool,
    /// Include the metrics snapshot in the outcome.
    pub return_metrics: bool,
    /// Emit the metrics record as one JSON line on stderr.
    pub log_metrics: bool,
}
