//! Teardown controller.
//!
//! [`AttemptGuard`] owns everything one attempt started: the child and its
//! process group, the receiving end of the pump channel, the pump thread and
//! the stdin writer. Dropping the guard (or calling [`AttemptGuard::teardown`])
//! releases them in order, and the sequence runs at most once no matter how
//! the attempt ended.

use super::pump::{join_thread_bounded, OutputPump, PumpItem, PumpStats};
use crossbeam_channel::Receiver;
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Wait after SIGTERM before escalating.
pub const TERM_GRACE: Duration = Duration::from_secs(5);
/// Wait after SIGKILL before giving up on the child.
pub const KILL_GRACE: Duration = Duration::from_secs(2);
/// Wait after signalling processes left in the group once the leader is gone.
pub const STRAGGLER_GRACE: Duration = Duration::from_millis(500);
/// Bound on joining the pump thread.
pub const PUMP_JOIN_LIMIT: Duration = Duration::from_secs(5);
/// Bound on joining the stdin writer.
pub const WRITER_JOIN_LIMIT: Duration = Duration::from_secs(2);

const EXIT_POLL: Duration = Duration::from_millis(10);

/// What teardown observed while cleaning up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Exit code, if the child exited on its own terms with one.
    pub exit_code: Option<i32>,
    /// Pump counters; `None` if the pump could not be joined in time.
    pub pump_stats: Option<PumpStats>,
    /// Whether the child itself had to be signalled.
    pub forced: bool,
}

pub struct AttemptGuard {
    child: Child,
    rx: Option<Receiver<PumpItem>>,
    pump: Option<OutputPump>,
    writer: Option<JoinHandle<()>>,
    status: Option<ExitStatus>,
    report: Option<TeardownReport>,
}

impl AttemptGuard {
    /// Take ownership of a freshly spawned child. From here on it is torn
    /// down even if the rest of the attempt never starts.
    pub fn new(child: Child) -> Self {
        Self {
            child,
            rx: None,
            pump: None,
            writer: None,
            status: None,
            report: None,
        }
    }

    pub fn attach(&mut self, pump: OutputPump, rx: Receiver<PumpItem>) {
        self.pump = Some(pump);
        self.rx = Some(rx);
    }

    pub fn attach_writer(&mut self, writer: JoinHandle<()>) {
        self.writer = Some(writer);
    }

    /// The pump channel, while the guard is still live.
    pub fn receiver(&self) -> Option<&Receiver<PumpItem>> {
        self.rx.as_ref()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Poll for the child's exit for up to `timeout`.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        if self.status.is_some() {
            return self.status;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.status = Some(status);
                    return self.status;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(EXIT_POLL);
                }
                Err(err) => {
                    debug!(error = %err, "failed to poll child status");
                    return None;
                }
            }
        }
    }

    /// Release every resource of the attempt. Later calls return the first report.
    pub fn teardown(&mut self) -> TeardownReport {
        if let Some(report) = self.report {
            return report;
        }

        // Unblocks a pump stuck on a full channel.
        self.rx = None;

        let forced = self.wait_for_exit(Duration::ZERO).is_none();
        if forced {
            self.terminate();
        }
        // Background jobs of the agent can outlive it and keep the pipe open.
        self.sweep_group();

        if let Some(writer) = self.writer.take() {
            join_thread_bounded(writer, WRITER_JOIN_LIMIT);
        }
        let pump_stats = self
            .pump
            .take()
            .and_then(|mut pump| pump.join_bounded(PUMP_JOIN_LIMIT));

        let report = TeardownReport {
            exit_code: self.status.and_then(|status| status.code()),
            pump_stats,
            forced,
        };
        self.report = Some(report);
        report
    }

    fn terminate(&mut self) {
        let pid = self.child.id();
        debug!(pid, "terminating agent process group");
        self.signal(Signal::SIGTERM);
        if self.wait_for_exit(TERM_GRACE).is_some() {
            return;
        }
        warn!(pid, "agent ignored SIGTERM; sending SIGKILL");
        self.signal(Signal::SIGKILL);
        if self.wait_for_exit(KILL_GRACE).is_none() {
            warn!(pid, "agent process did not exit after SIGKILL; abandoning it");
        }
    }

    /// Signal whatever is left of the process group after the leader is gone.
    fn sweep_group(&mut self) {
        if !self.group_alive() {
            return;
        }
        debug!(pid = self.child.id(), "terminating processes left in the agent group");
        self.signal(Signal::SIGTERM);
        let deadline = Instant::now() + STRAGGLER_GRACE;
        while self.group_alive() {
            if Instant::now() >= deadline {
                // Zombies also count as members, so this may be a no-op.
                self.signal(Signal::SIGKILL);
                return;
            }
            thread::sleep(EXIT_POLL);
        }
    }

    #[cfg(unix)]
    fn group_alive(&self) -> bool {
        let Ok(raw) = i32::try_from(self.child.id()) else {
            return false;
        };
        !matches!(
            killpg(Pid::from_raw(raw), None::<Signal>),
            Err(nix::errno::Errno::ESRCH)
        )
    }

    #[cfg(not(unix))]
    fn group_alive(&self) -> bool {
        false
    }

    #[cfg(unix)]
    fn signal(&mut self, signal: Signal) {
        let Ok(raw) = i32::try_from(self.child.id()) else {
            return;
        };
        match killpg(Pid::from_raw(raw), signal) {
            // ESRCH means the group is already gone
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(err) => debug!(error = %err, ?signal, "failed to signal process group"),
        }
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _signal: Signal) {
        if let Err(err) = self.child.kill() {
            debug!(error = %err, "failed to kill child");
        }
    }
}

#[cfg(not(unix))]
#[derive(Clone, Copy, Debug)]
enum Signal {
    SIGTERM,
    SIGKILL,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}
