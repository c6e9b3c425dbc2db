//! Exponential backoff shared by every retrying call path.
//!
//! Only errors the caller classifies as transient are retried; anything else
//! returns immediately. Sleeps race the cancellation token so an abandoned
//! request never keeps waiting.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry schedule: `base_delay * 2^n` after failed attempt `n`, at most
/// `max_attempts` attempts in total (the first call included).
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Backoff {
    /// Cold-start schedule for delegated predictions: 5 attempts, waiting
    /// 1s, 2s, 4s, 8s between them.
    pub const COLD_START: Backoff = Backoff {
        max_attempts: 5,
        base_delay: Duration::from_secs(1),
    };

    /// Transient-status schedule for LLM calls: 3 attempts, waiting 1s, 2s.
    pub const LLM_TRANSIENT: Backoff = Backoff {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
    };

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry)
    }

    #[cfg(test)]
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|n| self.delay_for(n))
            .collect()
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last: E },
    /// A non-transient error ended the sequence early.
    Fatal(E),
    Cancelled,
}

/// Runs `op` until it succeeds, fails non-transiently, exhausts the schedule,
/// or `cancel` fires. `op` receives the zero-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut op: F,
    is_transient: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = op(attempt) => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(RetryError::Fatal(e)),
            Err(e) => e,
        };

        if attempt + 1 >= backoff.max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt + 1,
                last: err,
            });
        }

        let delay = backoff.delay_for(attempt);
        warn!(
            "attempt {} failed ({err}), retrying after {}ms",
            attempt + 1,
            delay.as_millis()
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_cold_start_schedule_doubles_from_one_second() {
        let secs: Vec<u64> = Backoff::COLD_START
            .schedule()
            .iter()
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let result: Result<&str, RetryError<String>> = retry_with_backoff(
            &Backoff::COLD_START,
            &cancel,
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err("model loading".to_string())
                    } else {
                        Ok("ready")
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s of backoff elapsed on the paused clock.
        assert_eq!(started.elapsed().as_secs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_stops_after_five_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &Backoff::COLD_START,
            &cancel,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still initializing".to_string()) }
            },
            |_| true,
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last, "still initializing");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &Backoff::COLD_START,
            &cancel,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("bad request".to_string()) }
            },
            |e| e.contains("loading"),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_attempt_completes() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &Backoff::COLD_START,
            &cancel,
            |_| std::future::pending::<Result<(), String>>(),
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
