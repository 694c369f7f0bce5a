//! Outcome classification.
//!
//! Maps the raw facts of one attempt to success or a typed failure. The
//! checks run in a fixed order: timeouts, interpretation faults, upstream
//! errors, a missing session identifier, an empty result, and finally a
//! non-zero exit. Later checks only add context to a failure an earlier one
//! already decided; they never change its kind.

use super::attempt::AttemptReport;
use super::supervisor::TimeoutCause;
use crate::model::ErrorKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    /// Empty on success.
    pub message: String,
}

impl Verdict {
    fn fail(&mut self, kind: ErrorKind, reason: &str) {
        self.success = false;
        self.error_kind.get_or_insert(kind);
        self.message = if self.message.is_empty() {
            reason.to_string()
        } else {
            format!("{reason}\n\n{}", self.message)
        };
    }
}

pub fn classify(report: &AttemptReport, tool: &str) -> Verdict {
    if let Some(signal) = report.timeout {
        let kind = match signal.cause {
            TimeoutCause::Idle => ErrorKind::IdleTimeout,
            TimeoutCause::Duration => ErrorKind::Timeout,
        };
        return Verdict {
            success: false,
            error_kind: Some(kind),
            message: format!("{tool}: {signal}"),
        };
    }
    if let Some(fault) = &report.fault {
        return Verdict {
            success: false,
            error_kind: Some(ErrorKind::UnexpectedException),
            message: format!("unexpected error while reading {tool} output: {fault}"),
        };
    }

    let state = &report.state;
    let mut verdict = Verdict {
        success: true,
        error_kind: None,
        message: String::new(),
    };
    if state.had_error {
        verdict.success = false;
        verdict.error_kind = Some(ErrorKind::UpstreamError);
        verdict.message = if state.error_message.is_empty() {
            format!("{tool} reported an error")
        } else {
            state.error_message.clone()
        };
    }
    if state.session_id.is_none() {
        verdict.fail(
            ErrorKind::ProtocolMissingSession,
            &format!("{tool} did not report a SESSION_ID"),
        );
    }
    if verdict.success && state.result_text().is_empty() {
        verdict.fail(
            ErrorKind::EmptyResult,
            &format!("{tool} returned no response content"),
        );
    }
    if verdict.success {
        if let Some(code) = report.exit_code.filter(|code| *code != 0) {
            verdict.fail(
                ErrorKind::SubprocessError,
                &format!("{tool} exited with non-zero status {code}"),
            );
        }
    }
    verdict
}
