//! Retry wrapper for flaky backend calls
//!
//! Classifies failures by [`ErrorKind`]: transient kinds are retried with
//! exponential backoff and jitter, everything else fails fast. Backoff sleeps
//! are cooperative yields, so other sessions' work proceeds during a wait.

use std::future::Future;
use std::time::Duration;

use log::{error, warn};
use rand::Rng;

use crate::error::{Error, ErrorKind, Result};

/// Per-step backoff ceiling
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Pure retry configuration; a fresh attempt counter is scoped to each call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries beyond the first try (`3` means up to 4 invocations)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each retry up to 60 s
    pub base_delay: Duration,
    /// Error kinds worth another attempt
    pub retry_on: Vec<ErrorKind>,
    /// Add uniform jitter in `[0, delay/2]` to each backoff sleep
    pub jitter: bool,
    /// Overall budget for the whole run, attempts and sleeps included
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            retry_on: vec![ErrorKind::Network, ErrorKind::Timeout],
            jitter: true,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Execute `op` with retry logic.
    ///
    /// `operation` names the call in log lines and wrapped errors; callers may
    /// embed an entity id here for traceability (it never influences pacing).
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.deadline {
            None => self.run_attempts(operation, op).await,
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.run_attempts(operation, op)).await {
                    Ok(result) => result,
                    Err(_) => {
                        error!(
                            "Operation '{}' exceeded its {:.2}s deadline",
                            operation,
                            deadline.as_secs_f64()
                        );
                        Err(Error::DeadlineExceeded {
                            operation: operation.to_string(),
                        })
                    }
                }
            }
        }
    }

    async fn run_attempts<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = err
                        .kind()
                        .is_some_and(|kind| self.retry_on.contains(&kind));
                    if !retryable {
                        error!("Non-retryable error in operation '{}': {}", operation, err);
                        return Err(err);
                    }

                    failures += 1;
                    if failures > self.max_attempts {
                        error!(
                            "Operation '{}' failed after {} attempts: {}",
                            operation, failures, err
                        );
                        return Err(Error::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: failures,
                            source: Box::new(err),
                        });
                    }

                    let delay = self.delay_for(failures);
                    warn!(
                        "Operation '{}' attempt {}/{} failed: {}. Retrying in {:.2} seconds.",
                        operation,
                        failures,
                        self.max_attempts,
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Exponential schedule without jitter: `min(base * 2^(retry-1), 60s)`.
    fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(retry.saturating_sub(1) as i32);
        Duration::from_secs_f64(exp.min(BACKOFF_CAP.as_secs_f64()))
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff_delay(retry);
        if !self.jitter {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=0.5 * delay.as_secs_f64());
        delay + Duration::from_secs_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            retry_on: vec![ErrorKind::Network, ErrorKind::Timeout],
            jitter: false,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_exhaustion_invokes_one_plus_max_attempts() {
        let policy = quick_policy();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("always_down", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Network("connection reset".to_string()).into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(Error::RetriesExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source.kind(), Some(ErrorKind::Network));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_fails_fast() {
        let policy = quick_policy();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("bad_input", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::BadRequest("empty payload".to_string()).into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(Error::Api(ApiError::BadRequest(msg))) => assert!(msg.contains("empty")),
            other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = quick_policy();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result = policy
            .run("flaky", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ApiError::Timeout("slow".to_string()).into())
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deadline_aborts_the_run() {
        let policy = RetryPolicy {
            deadline: Some(Duration::from_millis(10)),
            ..quick_policy()
        };

        let result: Result<()> = policy
            .run("stalled", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        match result {
            Err(Error::DeadlineExceeded { operation }) => assert_eq!(operation, "stalled"),
            other => panic!("expected DeadlineExceeded, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(32));
        // 2^6 = 64 would exceed the cap
        assert_eq!(policy.backoff_delay(7), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_half_delay() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            jitter: true,
            ..RetryPolicy::default()
        };

        for _ in 0..32 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1500));
        }
    }
}
