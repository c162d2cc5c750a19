//! Bounded retry executor shared by every post-deploy check.
//!
//! An attempt reports one of three states: success, a retryable failure, or a
//! fatal failure. The executor sleeps `backoff.delay(attempt)` between
//! attempts and never after the last one.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DeployError, DeployResult};

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// delay = interval
    Fixed(Duration),
    /// delay = min(base * 2^attempt, max)
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(interval))
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self::new(max_attempts, Backoff::Exponential { base, max })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(10, Duration::from_secs(10))
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Success(T),
    Retry(String),
    Fatal(String),
}

/// Terminal state of a retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
    Aborted { attempts: u32, reason: String },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Aborted { attempts, .. } => *attempts,
        }
    }

    /// Last failure message, if the loop did not succeed.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            RetryOutcome::Succeeded { .. } => None,
            RetryOutcome::Exhausted { last_error, .. } => Some(last_error),
            RetryOutcome::Aborted { reason, .. } => Some(reason),
        }
    }

    /// Convert a failed loop into a [`DeployError::Validation`] naming the
    /// stage and the resource that was checked.
    pub fn into_validation(self, stage: &str, resource: &str) -> DeployResult<T> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(DeployError::validation(
                stage,
                resource,
                format!("gave up after {attempts} attempts: {last_error}"),
            )),
            RetryOutcome::Aborted { attempts, reason } => Err(DeployError::validation(
                stage,
                resource,
                format!("aborted on attempt {attempts}: {reason}"),
            )),
        }
    }
}

/// Run `attempt` until it succeeds, fails fatally, or the policy runs out.
///
/// The closure receives the 1-based attempt number.
pub fn retry<T, F>(policy: &RetryPolicy, mut attempt: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Attempt<T>,
{
    let mut last_error = String::new();
    for index in 0..policy.max_attempts {
        let number = index + 1;
        match attempt(number) {
            Attempt::Success(value) => {
                debug!(attempt = number, "attempt succeeded");
                return RetryOutcome::Succeeded {
                    value,
                    attempts: number,
                };
            }
            Attempt::Fatal(reason) => {
                warn!(attempt = number, %reason, "attempt failed fatally");
                return RetryOutcome::Aborted {
                    attempts: number,
                    reason,
                };
            }
            Attempt::Retry(reason) => {
                warn!(attempt = number, max = policy.max_attempts, %reason, "attempt failed");
                last_error = reason;
            }
        }

        if number < policy.max_attempts {
            let delay = policy.backoff.delay(index);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    RetryOutcome::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    #[test]
    fn succeeds_after_two_failures_with_three_invocations() {
        let mut calls = 0;
        let outcome = retry(&no_wait(5), |_| {
            calls += 1;
            if calls < 3 {
                Attempt::Retry(format!("failure {calls}"))
            } else {
                Attempt::Success("ok")
            }
        });

        assert!(outcome.is_success());
        assert_eq!(calls, 3);
        assert_eq!(outcome.attempts(), 3);
    }

    #[test]
    fn exhausts_all_attempts_and_keeps_last_error() {
        let mut calls = 0;
        let outcome: RetryOutcome<()> = retry(&no_wait(4), |n| {
            calls += 1;
            Attempt::Retry(format!("attempt {n}"))
        });

        assert_eq!(calls, 4);
        assert_eq!(outcome.last_error(), Some("attempt 4"));
        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 4, .. }));
    }

    #[test]
    fn fatal_failure_stops_immediately() {
        let mut calls = 0;
        let outcome: RetryOutcome<()> = retry(&no_wait(10), |_| {
            calls += 1;
            Attempt::Fatal("credentials rejected".to_string())
        });

        assert_eq!(calls, 1);
        assert!(matches!(outcome, RetryOutcome::Aborted { attempts: 1, .. }));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = no_wait(0);
        assert_eq!(policy.max_attempts(), 1);

        let mut calls = 0;
        let _: RetryOutcome<()> = retry(&policy, |_| {
            calls += 1;
            Attempt::Retry("nope".into())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(60),
            max: Duration::from_secs(600),
        };
        assert_eq!(backoff.delay(0), Duration::from_secs(60));
        assert_eq!(backoff.delay(1), Duration::from_secs(120));
        assert_eq!(backoff.delay(3), Duration::from_secs(480));
        assert_eq!(backoff.delay(4), Duration::from_secs(600));
        assert_eq!(backoff.delay(40), Duration::from_secs(600));
    }

    #[test]
    fn exhausted_outcome_becomes_validation_error() {
        let outcome: RetryOutcome<()> = RetryOutcome::Exhausted {
            attempts: 10,
            last_error: "connection refused".into(),
        };
        let err = outcome
            .into_validation("04-kubernetes-ingress", "tcp://10.0.0.1:443")
            .unwrap_err();
        assert!(matches!(err, DeployError::Validation { .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}
