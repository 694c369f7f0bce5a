use super::completion::CompletionDetector;
use super::launcher;
use super::pump::{OutputPump, CHANNEL_CAPACITY};
use super::state::RunState;
use super::supervisor::{Supervisor, TimeoutCause, TimeoutPolicy, TimeoutSignal};
use super::teardown::AttemptGuard;
use crate::error::EngineResult;
use crate::model::InvocationRequest;
use crate::protocol::AgentProtocol;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a child that ended its stream gets to exit on its own.
pub const NATURAL_EXIT_WAIT: Duration = Duration::from_secs(5);

/// Raw facts about one attempt, before classification.
#[derive(Debug)]
pub struct AttemptReport {
    pub state: RunState,
    /// `None` when the child was terminated or its status is unknown.
    pub exit_code: Option<i32>,
    pub raw_lines: u64,
    pub timeout: Option<TimeoutSignal>,
    /// Description of a panic caught while interpreting output.
    pub fault: Option<String>,
}

/// Run the child once, from launch to teardown.
///
/// Launch failures are returned as errors. Everything after a successful
/// launch, including timeouts and interpretation faults, is recorded in the
/// report, and the child is always torn down before this returns.
pub fn run_attempt(
    request: &InvocationRequest,
    protocol: &dyn AgentProtocol,
    capture_messages: bool,
) -> EngineResult<AttemptReport> {
    let started = Instant::now();
    let launched = launcher::launch(request)?;
    let mut guard = AttemptGuard::new(launched.child);
    let detector = CompletionDetector::new(protocol.completion_types());
    let (pump, rx) = OutputPump::spawn(launched.output, detector, CHANNEL_CAPACITY)?;
    guard.attach(pump, rx);
    if let Some(writer) = launcher::write_input(guard.child_mut(), request.input.clone())? {
        guard.attach_writer(writer);
    }

    let mut supervisor = Supervisor::new(
        TimeoutPolicy::new(request.idle_timeout, request.max_duration),
        started,
    );
    let mut state = RunState::new(capture_messages);
    let mut timeout = None;
    let mut fault = None;
    let mut lines_seen: u64 = 0;

    while let Some(rx) = guard.receiver() {
        match supervisor.next_line(rx) {
            Ok(Some(line)) => {
                lines_seen += 1;
                let observed = catch_unwind(AssertUnwindSafe(|| state.observe(&line, protocol)));
                if let Err(payload) = observed {
                    let message = panic_message(payload.as_ref());
                    warn!(protocol = protocol.name(), %message, "output interpretation failed");
                    fault = Some(message);
                    break;
                }
            }
            Ok(None) => break,
            Err(signal) => {
                match signal.cause {
                    TimeoutCause::Idle => warn!(limit_s = signal.limit.as_secs(), "agent idle timeout"),
                    TimeoutCause::Duration => {
                        warn!(limit_s = signal.limit.as_secs(), "agent max duration exceeded");
                    }
                }
                timeout = Some(signal);
                break;
            }
        }
    }

    if timeout.is_none() && fault.is_none() && guard.wait_for_exit(NATURAL_EXIT_WAIT).is_none() {
        debug!("agent still running after its output ended; terminating it");
    }
    let report = guard.teardown();

    Ok(AttemptReport {
        state,
        // A child we had to signal has no meaningful exit code.
        exit_code: if report.forced { None } else { report.exit_code },
        raw_lines: report.pump_stats.map_or(lines_seen, |stats| stats.raw_lines),
        timeout,
        fault,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
