//! Per-invocation metrics.
//!
//! A [`MetricsRecorder`] is started when a tool call arrives and finished once
//! the final outcome is known, so one snapshot spans every retry attempt.

use crate::model::{ErrorKind, SandboxMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Immutable metrics for one tool invocation. `None` fields are omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ts_start: DateTime<Utc>,
    pub ts_end: DateTime<Utc>,
    pub duration_ms: u64,
    pub tool: String,
    pub sandbox: SandboxMode,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub prompt_chars: u64,
    pub prompt_lines: u64,
    pub result_chars: u64,
    pub result_lines: u64,
    pub raw_output_lines: u64,
    pub json_decode_errors: u64,
}

impl MetricsSnapshot {
    /// Render as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Append the record to a diagnostic sink as one line of JSON.
    pub fn write_jsonl<W: Write>(&self, mut sink: W) -> io::Result<()> {
        let line = self.to_json_line();
        writeln!(sink, "{line}")?;
        sink.flush()
    }
}

/// Final figures of an invocation, handed to [`MetricsRecorder::finish`].
#[derive(Clone, Debug, Default)]
pub struct RunSummary<'a> {
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub result: &'a str,
    pub exit_code: Option<i32>,
    pub raw_output_lines: u64,
    pub json_decode_errors: u64,
    pub retries: u32,
}

#[derive(Clone, Debug)]
pub struct MetricsRecorder {
    tool: String,
    sandbox: SandboxMode,
    prompt_chars: u64,
    prompt_lines: u64,
    ts_start: DateTime<Utc>,
    started: Instant,
}

impl MetricsRecorder {
    pub fn start(tool: impl Into<String>, prompt: &str, sandbox: SandboxMode) -> Self {
        Self {
            tool: tool.into(),
            sandbox,
            prompt_chars: count_u64(prompt.chars().count()),
            prompt_lines: count_u64(prompt.matches('\n').count()) + 1,
            ts_start: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(&self, summary: &RunSummary<'_>) -> MetricsSnapshot {
        let elapsed = self.elapsed();
        let result_lines = if summary.result.is_empty() {
            0
        } else {
            count_u64(summary.result.matches('\n').count()) + 1
        };
        MetricsSnapshot {
            ts_start: self.ts_start,
            ts_end: Utc::now(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            tool: self.tool.clone(),
            sandbox: self.sandbox,
            success: summary.success,
            error_kind: summary.error_kind,
            retries: summary.retries,
            exit_code: summary.exit_code,
            prompt_chars: self.prompt_chars,
            prompt_lines: self.prompt_lines,
            result_chars: count_u64(summary.result.chars().count()),
            result_lines,
            raw_output_lines: summary.raw_output_lines,
            json_decode_errors: summary.json_decode_errors,
        }
    }
}

fn count_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
