//! Retry, timeout and cancellation policy for gateway calls.
//!
//! Every attempt is bounded by the per-call timeout and raced against the
//! run's cancellation token; so is every backoff sleep. A timed-out attempt
//! counts as `GatewayUnavailable`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolwright_config::AgentConfig;
use toolwright_core::error::GatewayError;
use tracing::{debug, warn};

/// How gateway calls are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Treated as at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub per_call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    Exhausted { attempts: u32, last: GatewayError },
    Cancelled,
}

impl RetryPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_attempts: config.gateway_retry_limit,
            initial_delay: Duration::from_millis(config.retry_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: 2.0,
            per_call_timeout: config.per_call_timeout(),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `call` until it succeeds, the attempts are used up, or `cancel`
    /// fires. `call` is invoked once per attempt.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            debug!(operation, attempt, "Calling model gateway");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = tokio::time::timeout(self.per_call_timeout, call()) => outcome,
            };

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => GatewayError::unavailable(format!(
                    "{operation} timed out after {}s",
                    self.per_call_timeout.as_secs_f64()
                )),
            };

            if attempt >= max_attempts {
                warn!(operation, attempt, error = %error, "Gateway retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Gateway call failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            backoff_multiplier: 2.0,
            per_call_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(1500));
        assert_eq!(p.delay_for(30), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_below_limit_recover() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result = policy(3)
            .run("decide", &CancellationToken::new(), move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(GatewayError::unavailable("503"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        // 500ms + 1000ms of backoff.
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_and_last_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = policy(2)
            .run("critique", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::malformed("not JSON"))
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: GatewayError::malformed("not JSON"),
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let calls = &AtomicU32::new(0);
        let _: Result<(), _> = policy(0)
            .run("decide", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::unavailable("down"))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out_as_unavailable() {
        let result: Result<(), _> = policy(1)
            .run("decide", &CancellationToken::new(), move || async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        match result {
            Err(RetryError::Exhausted {
                last: GatewayError::Unavailable(message),
                ..
            }) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = policy(3)
            .run("decide", &cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = policy(3)
            .run("decide", &cancel, move || async move { Err(GatewayError::unavailable("503")) })
            .await;
        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
