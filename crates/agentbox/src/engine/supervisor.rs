//! Dual-timeout supervisor.
//!
//! Consumes the pump's channel while enforcing two independent limits: an
//! idle timeout (no line of any kind for too long) and an optional
//! wall-clock ceiling. The ceiling is checked first, so when both would fire
//! the failure is reported as a duration timeout.

use super::pump::PumpItem;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fmt;
use std::time::{Duration, Instant};

/// Upper bound on how long the supervisor blocks before re-checking limits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    IdleTimedOut,
    DurationTimedOut,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutCause {
    Idle,
    Duration,
}

/// Raised when either limit is reached. Carries the limit that fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutSignal {
    pub cause: TimeoutCause,
    pub limit: Duration,
    pub elapsed: Duration,
}

impl fmt::Display for TimeoutSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            TimeoutCause::Idle => write!(
                f,
                "no output for {}s (idle timeout {}s)",
                self.elapsed.as_secs(),
                self.limit.as_secs()
            ),
            TimeoutCause::Duration => write!(
                f,
                "total run time {}s exceeded the max duration of {}s",
                self.elapsed.as_secs(),
                self.limit.as_secs()
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub idle: Duration,
    /// `None` disables the ceiling.
    pub max_duration: Option<Duration>,
    pub poll_interval: Duration,
}

impl TimeoutPolicy {
    pub fn new(idle: Duration, max_duration: Option<Duration>) -> Self {
        Self {
            idle,
            max_duration: max_duration.filter(|limit| !limit.is_zero()),
            poll_interval: POLL_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub struct Supervisor {
    policy: TimeoutPolicy,
    started: Instant,
    last_activity: Instant,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(policy: TimeoutPolicy, started: Instant) -> Self {
        Self {
            policy,
            started,
            last_activity: started,
            state: SupervisorState::Running,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Any line, empty or not, counts as activity.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Evaluate both limits at `now`, moving to a timed-out state if one fired.
    pub fn check(&mut self, now: Instant) -> Result<(), TimeoutSignal> {
        if self.state != SupervisorState::Running {
            return Ok(());
        }
        if let Some(limit) = self.policy.max_duration {
            let elapsed = now.saturating_duration_since(self.started);
            if elapsed >= limit {
                self.state = SupervisorState::DurationTimedOut;
                return Err(TimeoutSignal {
                    cause: TimeoutCause::Duration,
                    limit,
                    elapsed,
                });
            }
        }
        let idle = now.saturating_duration_since(self.last_activity);
        if idle >= self.policy.idle {
            self.state = SupervisorState::IdleTimedOut;
            return Err(TimeoutSignal {
                cause: TimeoutCause::Idle,
                limit: self.policy.idle,
                elapsed: idle,
            });
        }
        Ok(())
    }

    /// Block for the next non-empty line.
    ///
    /// Returns `Ok(None)` once the stream has ended. Empty lines reset the
    /// idle clock but are not surfaced.
    pub fn next_line(&mut self, rx: &Receiver<PumpItem>) -> Result<Option<String>, TimeoutSignal> {
        loop {
            if self.state == SupervisorState::Completed {
                return Ok(None);
            }
            let now = Instant::now();
            self.check(now)?;
            match rx.recv_timeout(self.wait_budget(now)) {
                Ok(PumpItem::Line(line)) => {
                    self.record_activity(Instant::now());
                    if !line.is_empty() {
                        return Ok(Some(line));
                    }
                }
                Ok(PumpItem::End) | Err(RecvTimeoutError::Disconnected) => {
                    self.state = SupervisorState::Completed;
                    return Ok(None);
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Time until the nearest deadline, capped at the poll interval.
    ///
    /// A deadline too far out to represent as an `Instant` never bounds the wait.
    fn wait_budget(&self, now: Instant) -> Duration {
        let mut budget = self.policy.poll_interval;
        if let Some(deadline) = self.last_activity.checked_add(self.policy.idle) {
            budget = budget.min(deadline.saturating_duration_since(now));
        }
        let ceiling = self
            .policy
            .max_duration
            .and_then(|limit| self.started.checked_add(limit));
        if let Some(deadline) = ceiling {
            budget = budget.min(deadline.saturating_duration_since(now));
        }
        budget.max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn policy(idle_s: u64, max_s: Option<u64>) -> TimeoutPolicy {
        TimeoutPolicy::new(Duration::from_secs(idle_s), max_s.map(Duration::from_secs))
    }

    #[test]
    fn duration_wins_when_both_limits_are_reached() {
        let start = Instant::now();
        let mut supervisor = Supervisor::new(policy(5, Some(5)), start);
        let signal = supervisor.check(start + Duration::from_secs(6)).unwrap_err();
        assert_eq!(signal.cause, TimeoutCause::Duration);
        assert_eq!(signal.limit, Duration::from_secs(5));
        assert_eq!(supervisor.state(), SupervisorState::DurationTimedOut);
    }

    #[test]
    fn activity_resets_idle_clock_but_not_ceiling() {
        let start = Instant::now();
        let mut supervisor = Supervisor::new(policy(10, Some(30)), start);
        for step in 1..=3 {
            let now = start + Duration::from_secs(step * 8);
            supervisor.check(now).unwrap();
            supervisor.record_activity(now);
        }
        let signal = supervisor.check(start + Duration::from_secs(31)).unwrap_err();
        assert_eq!(signal.cause, TimeoutCause::Duration);
    }

    #[test]
    fn idle_fires_without_activity() {
        let start = Instant::now();
        let mut supervisor = Supervisor::new(policy(2, None), start);
        supervisor.check(start + Duration::from_secs(1)).unwrap();
        let signal = supervisor.check(start + Duration::from_secs(2)).unwrap_err();
        assert_eq!(signal.cause, TimeoutCause::Idle);
        assert_eq!(supervisor.state(), SupervisorState::IdleTimedOut);
        assert!(signal.to_string().contains("idle timeout 2s"));
    }

    #[test]
    fn zero_ceiling_means_unbounded() {
        let start = Instant::now();
        let mut supervisor = Supervisor::new(policy(100, Some(0)), start);
        supervisor.check(start + Duration::from_secs(99)).unwrap();
    }

    #[test]
    fn skips_empty_lines_and_completes_on_end() {
        let (tx, rx) = bounded(8);
        tx.send(PumpItem::Line(String::new())).unwrap();
        tx.send(PumpItem::Line("hello".into())).unwrap();
        tx.send(PumpItem::End).unwrap();
        let mut supervisor = Supervisor::new(policy(5, None), Instant::now());
        assert_eq!(supervisor.next_line(&rx).unwrap().as_deref(), Some("hello"));
        assert_eq!(supervisor.next_line(&rx).unwrap(), None);
        assert_eq!(supervisor.state(), SupervisorState::Completed);
        assert_eq!(supervisor.next_line(&rx).unwrap(), None);
    }

    #[test]
    fn disconnected_channel_counts_as_end() {
        let (tx, rx) = bounded::<PumpItem>(1);
        drop(tx);
        let mut supervisor = Supervisor::new(policy(5, None), Instant::now());
        assert_eq!(supervisor.next_line(&rx).unwrap(), None);
    }

    #[test]
    fn unrepresentable_deadlines_wait_one_poll() {
        let policy = TimeoutPolicy::new(Duration::MAX, Some(Duration::MAX));
        let start = Instant::now();
        let mut supervisor = Supervisor::new(policy, start);
        assert_eq!(supervisor.wait_budget(start), POLL_INTERVAL);
        supervisor.check(start + Duration::from_secs(3600)).unwrap();

        let (tx, rx) = bounded(2);
        tx.send(PumpItem::Line("x".into())).unwrap();
        tx.send(PumpItem::End).unwrap();
        assert_eq!(supervisor.next_line(&rx).unwrap().as_deref(), Some("x"));
        assert_eq!(supervisor.next_line(&rx).unwrap(), None);
    }

    #[test]
    fn silent_channel_times_out() {
        let (_tx, rx) = bounded::<PumpItem>(1);
        let mut policy = TimeoutPolicy::new(Duration::from_millis(100), None);
        policy.poll_interval = Duration::from_millis(20);
        let mut supervisor = Supervisor::new(policy, Instant::now());
        let signal = supervisor.next_line(&rx).unwrap_err();
        assert_eq!(signal.cause, TimeoutCause::Idle);
    }
}
