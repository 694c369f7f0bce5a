use crate::model::{ErrorKind, RetryPolicy};
use std::time::Duration;

/// Delay before the attempt that follows failed attempt `attempt` (0-based).
pub fn backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
    policy.base_delay.saturating_mul(factor)
}

/// Whether failed attempt `attempt` (0-based) may be followed by another.
pub fn should_retry(policy: &RetryPolicy, attempt: u32, kind: ErrorKind) -> bool {
    attempt < policy.max_retries && kind.is_retryable(policy.retry_on_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_half_a_second() {
        let policy = RetryPolicy::new(3);
        assert_eq!(backoff(&policy, 0), Duration::from_millis(500));
        assert_eq!(backoff(&policy, 1), Duration::from_secs(1));
        assert_eq!(backoff(&policy, 2), Duration::from_secs(2));
        assert!(backoff(&policy, 64) >= Duration::from_secs(1_000_000));
    }

    #[test]
    fn retry_budget_and_eligibility() {
        let policy = RetryPolicy::new(1);
        assert!(should_retry(&policy, 0, ErrorKind::EmptyResult));
        assert!(!should_retry(&policy, 1, ErrorKind::EmptyResult));
        assert!(!should_retry(&policy, 0, ErrorKind::CommandNotFound));
        assert!(!should_retry(&policy, 0, ErrorKind::IdleTimeout));
        assert!(should_retry(
            &policy.with_timeout_retries(true),
            0,
            ErrorKind::Timeout
        ));
        assert!(!should_retry(&RetryPolicy::new(0), 0, ErrorKind::UpstreamError));
    }
}
