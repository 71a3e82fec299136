//! In-process retry handling for failed step attempts.
//!
//! This is the per-step policy from the workflow document. It is unrelated
//! to the delivery fault counter kept by the coordinator.

use std::time::Duration;

use agentflow_types::workflow::{MAX_RETRY_DELAY_MS, RetryPolicy};
use tokio_util::sync::CancellationToken;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then re-run the step.
    Retry { delay: Duration },
    /// Mark the step failed.
    GiveUp,
}

/// Stateless retry handler for step failures.
///
/// No internal state; all logic lives in associated functions that take the
/// policy as a parameter.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt is allowed after `retry_count` retries.
    ///
    /// A step without a policy is never retried.
    pub fn should_retry(policy: Option<&RetryPolicy>, retry_count: u32) -> bool {
        policy.is_some_and(|p| retry_count < p.max_retries)
    }

    /// Wait between attempts, capped at one minute.
    pub fn delay(policy: &RetryPolicy) -> Duration {
        Duration::from_millis(policy.delay_ms.min(MAX_RETRY_DELAY_MS))
    }

    pub fn decide(policy: Option<&RetryPolicy>, retry_count: u32) -> RetryDecision {
        match policy {
            Some(p) if Self::should_retry(policy, retry_count) => RetryDecision::Retry {
                delay: Self::delay(p),
            },
            _ => RetryDecision::GiveUp,
        }
    }

    /// Sleep for `delay` unless `cancel` fires first.
    ///
    /// Returns `false` when the wait was interrupted.
    pub async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_respects_max() {
        let policy = RetryPolicy::new(2, 0);
        assert!(RetryHandler::should_retry(Some(&policy), 0));
        assert!(RetryHandler::should_retry(Some(&policy), 1));
        assert!(!RetryHandler::should_retry(Some(&policy), 2));
    }

    #[test]
    fn test_no_policy_never_retries() {
        assert!(!RetryHandler::should_retry(None, 0));
        assert_eq!(RetryHandler::decide(None, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_retries_gives_up() {
        let policy = RetryPolicy::none();
        assert_eq!(RetryHandler::decide(Some(&policy), 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_decide_returns_delay() {
        let policy = RetryPolicy::new(3, 1500);
        assert_eq!(
            RetryHandler::decide(Some(&policy), 0),
            RetryDecision::Retry {
                delay: Duration::from_millis(1500)
            }
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 1,
            delay_ms: 10 * MAX_RETRY_DELAY_MS,
        };
        assert_eq!(RetryHandler::delay(&policy), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_wait_completes() {
        let token = CancellationToken::new();
        assert!(RetryHandler::wait(Duration::from_millis(5), &token).await);
        assert!(RetryHandler::wait(Duration::ZERO, &token).await);
    }

    #[tokio::test]
    async fn test_wait_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        assert!(!RetryHandler::wait(Duration::from_secs(30), &token).await);
    }

    #[tokio::test]
    async fn test_wait_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!RetryHandler::wait(Duration::ZERO, &token).await);
    }
}
