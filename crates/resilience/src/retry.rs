use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use firmscout_core::config::RetryConfig;
use firmscout_core::ExtractError;

use crate::breaker::CircuitBreaker;
use crate::classify::{classify, is_retryable, FailureClass};

/// Exponential backoff shaped by failure class: rate-limit failures triple
/// the base delay, timeouts halve it. Jitter is ±10%, floor 100 ms.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exp_base: f64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exp_base: config.exp_base,
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Same policy with the base delay scaled; used by rate-limit recovery.
    pub fn with_base_factor(&self, factor: f64) -> Self {
        Self {
            base_delay: self.base_delay.mul_f64(factor),
            ..self.clone()
        }
    }

    pub fn delay_for(&self, attempt: u32, class: FailureClass) -> Duration {
        let mut base = self.base_delay.as_secs_f64();
        match class {
            FailureClass::RateLimit => base *= 3.0,
            FailureClass::Timeout => base *= 0.5,
            _ => {}
        }

        let mut delay = base * self.exp_base.powi(attempt as i32) * self.multiplier;
        delay = delay.min(self.max_delay.as_secs_f64());

        if self.jitter {
            let jitter = delay * 0.1;
            delay += rand::thread_rng().gen_range(-jitter..=jitter);
        }

        Duration::from_secs_f64(delay.max(0.1))
    }
}

/// Invokes `op` up to `max_attempts` times. Non-retryable failures and the
/// final attempt's failure propagate unchanged.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, ExtractError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let class = classify(&error);
                if attempt + 1 >= policy.max_attempts {
                    return Err(error);
                }
                if !is_retryable(class) {
                    debug!(?class, "failure not retryable, giving up");
                    return Err(error);
                }
                let delay = policy.delay_for(attempt, class);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry composed around a circuit breaker: every attempt passes through the
/// gate, so an open circuit aborts the remaining attempts immediately.
pub async fn run_resilient<T, F, Fut>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    op: F,
) -> Result<T, ExtractError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    execute_with_retry(policy, |_| breaker.call(op())).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use firmscout_core::config::BreakerConfig;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exp_base: 2.0,
            multiplier: 1.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn stops_after_max_attempts_and_propagates_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&fast_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExtractError::Crawl { url: "http://a".into(), message: "reset".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&fast_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExtractError::Validation("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_midway() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&fast_policy(5), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ExtractError::Crawl { url: "http://a".into(), message: "reset".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_shaping_by_class() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exp_base: 2.0,
            multiplier: 1.0,
            jitter: false,
        };
        let plain = policy.delay_for(0, FailureClass::Transient);
        let throttled = policy.delay_for(0, FailureClass::RateLimit);
        let timed_out = policy.delay_for(0, FailureClass::Timeout);
        assert_eq!(plain, Duration::from_secs(1));
        assert_eq!(throttled, Duration::from_secs(3));
        assert_eq!(timed_out, Duration::from_millis(500));
    }

    #[test]
    fn delay_clipped_to_max_and_floored() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            exp_base: 2.0,
            multiplier: 1.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for(5, FailureClass::Transient), Duration::from_secs(15));

        let tiny = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..policy
        };
        assert_eq!(tiny.delay_for(0, FailureClass::Timeout), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_retries() {
        let breaker = CircuitBreaker::new(
            "search",
            &BreakerConfig {
                failure_threshold: 1,
                recovery_timeout_s: 60,
                success_threshold: 1,
            },
        );
        // Trip the breaker.
        let _ = breaker
            .call(async { Err::<(), _>(ExtractError::Unexpected("boom".into())) })
            .await;

        let polled = AtomicU32::new(0);
        let result: Result<(), _> = run_resilient(&fast_policy(5), &breaker, || async {
            polled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ExtractError::CircuitOpen(_))));
        // CircuitOpen is non-retryable, so one attempt only, and the gate
        // rejected it before the operation future was ever polled.
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }
}
