//! Subprocess execution and supervision engine.
//!
//! [`invoke`] runs one agent invocation end to end: launch, stream, supervise,
//! tear down, classify, retry with backoff, and fold everything into an
//! [`Outcome`]. It never returns an error and never panics on agent output.

mod attempt;
mod classify;
mod completion;
mod launcher;
mod pump;
mod retry;
mod state;
mod supervisor;
mod teardown;

pub use attempt::{run_attempt, AttemptReport, NATURAL_EXIT_WAIT};
pub use classify::{classify, Verdict};
pub use completion::CompletionDetector;
pub use launcher::resolve_executable;
pub use pump::{OutputPump, PumpItem, PumpStats, CHANNEL_CAPACITY, COMPLETION_GRACE};
pub use retry::{backoff, should_retry};
pub use state::RunState;
pub use supervisor::{
    Supervisor, SupervisorState, TimeoutCause, TimeoutPolicy, TimeoutSignal, POLL_INTERVAL,
};
pub use teardown::{AttemptGuard, TeardownReport, KILL_GRACE, PUMP_JOIN_LIMIT, TERM_GRACE};

use crate::metrics::{MetricsRecorder, RunSummary};
use crate::model::{
    ErrorDetail, ErrorKind, InvocationRequest, Outcome, ResponseOptions, SandboxMode,
};
use crate::protocol::AgentProtocol;
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Who is being invoked and how the response should be shaped.
#[derive(Clone, Copy)]
pub struct ToolRun<'a> {
    /// Tool name reported in the outcome and metrics.
    pub tool: &'a str,
    pub sandbox: SandboxMode,
    pub protocol: &'a dyn AgentProtocol,
    pub options: ResponseOptions,
}

/// Final state of the last attempt, kept for the outcome.
struct AttemptResult {
    verdict: Verdict,
    session_id: Option<String>,
    result: String,
    exit_code: Option<i32>,
    last_lines: Vec<String>,
    raw_lines: u64,
    decode_errors: u64,
    messages: Option<Vec<Value>>,
}

impl AttemptResult {
    fn from_report(mut report: AttemptReport, tool: &str) -> Self {
        let verdict = classify(&report, tool);
        Self {
            session_id: report.state.session_id.clone(),
            result: report.state.result_text(),
            exit_code: report.exit_code,
            last_lines: report.state.last_lines(),
            raw_lines: report.raw_lines,
            decode_errors: report.state.decode_errors,
            messages: report.state.take_messages(),
            verdict,
        }
    }

    fn launch_failure(kind: ErrorKind, message: String) -> Self {
        Self {
            verdict: Verdict {
                success: false,
                error_kind: Some(kind),
                message,
            },
            session_id: None,
            result: String::new(),
            exit_code: None,
            last_lines: Vec::new(),
            raw_lines: 0,
            decode_errors: 0,
            messages: None,
        }
    }
}

/// Run `request` to completion, retrying per its policy.
pub fn invoke(run: &ToolRun<'_>, request: &InvocationRequest) -> Outcome {
    invoke_with_sleep(run, request, thread::sleep)
}

/// [`invoke`] with an injectable backoff sleep.
pub fn invoke_with_sleep<S>(run: &ToolRun<'_>, request: &InvocationRequest, mut sleep: S) -> Outcome
where
    S: FnMut(Duration),
{
    let recorder = MetricsRecorder::start(run.tool, &request.input, run.sandbox);
    let capture = run.options.return_all_messages;
    let mut attempt: u32 = 0;

    let last = loop {
        let current = match run_attempt(request, run.protocol, capture) {
            Ok(report) => AttemptResult::from_report(report, run.tool),
            Err(err) => AttemptResult::launch_failure(err.kind(), err.to_string()),
        };
        debug!(
            tool = run.tool,
            attempt,
            success = current.verdict.success,
            error_kind = ?current.verdict.error_kind,
            "attempt classified"
        );
        let Some(kind) = current.verdict.error_kind.filter(|_| !current.verdict.success) else {
            break current;
        };
        if !should_retry(&request.retry, attempt, kind) {
            break current;
        }
        let delay = backoff(&request.retry, attempt);
        info!(
            tool = run.tool,
            attempt,
            %kind,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying agent after failure"
        );
        sleep(delay);
        attempt += 1;
    };

    build_outcome(run, request, &recorder, last, attempt)
}

fn build_outcome(
    run: &ToolRun<'_>,
    request: &InvocationRequest,
    recorder: &MetricsRecorder,
    last: AttemptResult,
    retries: u32,
) -> Outcome {
    let elapsed = recorder.elapsed();
    let verdict = last.verdict;
    let kind = verdict.error_kind.unwrap_or(ErrorKind::UnexpectedException);

    let snapshot = recorder.finish(&RunSummary {
        success: verdict.success,
        error_kind: verdict.error_kind,
        result: &last.result,
        exit_code: last.exit_code,
        raw_output_lines: last.raw_lines,
        json_decode_errors: last.decode_errors,
        retries,
    });

    let mut outcome = if verdict.success {
        Outcome::success(run.tool, last.session_id, last.result, elapsed)
    } else {
        let detail = ErrorDetail {
            exit_code: last.exit_code,
            last_lines: last.last_lines,
            json_decode_errors: last.decode_errors,
            retries,
            ..ErrorDetail::new(verdict.message)
        }
        .with_timeout_context(kind, request.idle_timeout, request.max_duration);
        let mut outcome = Outcome::failure(run.tool, kind, detail, elapsed);
        outcome.session_id = last.session_id;
        outcome
    };

    emit_metrics(run, &snapshot);
    if run.options.return_all_messages {
        outcome.all_messages = Some(last.messages.unwrap_or_default());
    }
    if run.options.return_metrics {
        outcome.metrics = Some(snapshot);
    }
    outcome
}

/// Build a failed outcome for a call rejected before any process started.
pub fn reject(run: &ToolRun<'_>, prompt: &str, kind: ErrorKind, message: String) -> Outcome {
    let recorder = MetricsRecorder::start(run.tool, prompt, run.sandbox);
    let snapshot = recorder.finish(&RunSummary {
        error_kind: Some(kind),
        ..RunSummary::default()
    });
    let mut outcome = Outcome::failure(run.tool, kind, ErrorDetail::new(message), recorder.elapsed());
    emit_metrics(run, &snapshot);
    if run.options.return_all_messages {
        outcome.all_messages = Some(Vec::new());
    }
    if run.options.return_metrics {
        outcome.metrics = Some(snapshot);
    }
    outcome
}

fn emit_metrics(run: &ToolRun<'_>, snapshot: &crate::metrics::MetricsSnapshot) {
    if !run.options.log_metrics {
        return;
    }
    if let Err(err) = snapshot.write_jsonl(std::io::stderr().lock()) {
        debug!(error = %err, "failed to write metrics record");
    }
}
