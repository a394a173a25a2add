//! Retry loop: run an async operation until success or policy says stop.

use std::future::Future;

use super::error::CollabError;
use super::policy::{RetryDecision, RetryPolicy};

/// Final result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, CollabError>,
    pub attempts: u32,
}

/// Runs `f` until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// `f` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CollabError>>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(v) => {
                return RetryOutcome {
                    result: Ok(v),
                    attempts: attempt,
                }
            }
            Err(e) => match policy.decide(attempt, e.kind) {
                RetryDecision::NoRetry => {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    }
                }
                RetryDecision::RetryAfter(d) => {
                    tracing::warn!(attempt, delay_ms = d.as_millis() as u64, "retrying after error: {}", e);
                    tokio::time::sleep(d).await;
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = run_with_retry(&RetryPolicy::immediate(3), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CollabError::new(ErrorKind::Throttled, "slow down"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.result.unwrap(), 2);
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let out: RetryOutcome<()> = run_with_retry(&RetryPolicy::immediate(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CollabError::new(ErrorKind::Timeout, "timed out")) }
        })
        .await;
        assert!(out.result.is_err());
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let out: RetryOutcome<()> = run_with_retry(&RetryPolicy::immediate(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CollabError::permanent("bad input")) }
        })
        .await;
        assert_eq!(out.attempts, 1);
        assert_eq!(out.result.unwrap_err().message, "bad input");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
