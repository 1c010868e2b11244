//! Retry policy for failed attempts.

use std::time::Duration;

use crate::SchedulerConfig;

/// How a failed attempt is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue the job; it becomes ready after `delay`
    Retry { delay: Duration },
    /// Give up; the job fails with its last error
    Exhausted,
}

/// Exponential backoff, capped, with a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: config.base_retry_backoff,
            max_backoff: config.max_retry_backoff,
        }
    }

    /// Decide what happens after attempt number `attempt` (1-based) failed
    pub fn decide(&self, attempt: u32, failure: FailureKind) -> RetryDecision {
        match failure {
            FailureKind::Permanent => RetryDecision::Exhausted,
            FailureKind::Transient if attempt >= self.max_attempts => RetryDecision::Exhausted,
            FailureKind::Transient => RetryDecision::Retry {
                delay: self.backoff(attempt),
            },
        }
    }

    /// `base * 2^(attempt-1)`, capped at `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(2_u32.pow(exponent))
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(7), Duration::from_secs(60));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_transient_failures_retry_until_exhausted() {
        let policy = policy();
        assert_eq!(
            policy.decide(1, FailureKind::Transient),
            RetryDecision::Retry { delay: Duration::from_secs(1) }
        );
        assert_eq!(
            policy.decide(2, FailureKind::Transient),
            RetryDecision::Retry { delay: Duration::from_secs(2) }
        );
        assert_eq!(policy.decide(3, FailureKind::Transient), RetryDecision::Exhausted);
    }

    #[test]
    fn test_permanent_failure_never_retries() {
        assert_eq!(policy().decide(1, FailureKind::Permanent), RetryDecision::Exhausted);
    }
}
