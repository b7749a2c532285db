use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use firmscout_core::config::BreakerConfig;
use firmscout_core::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    /// At most one half-open trial is in flight at a time.
    trial_in_flight: bool,
}

/// Per-dependency failure gate: CLOSED passes calls through, OPEN fails them
/// fast, HALF_OPEN lets a single trial probe the dependency after the
/// recovery timeout.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    inner: Mutex<BreakerInner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_secs(config.recovery_timeout_s),
            success_threshold: config.success_threshold,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Runs `fut` through the gate. In OPEN state the future is never polled;
    /// the caller gets `CircuitOpen` immediately.
    pub async fn call<T, Fut>(&self, fut: Fut) -> Result<T, ExtractError>
    where
        Fut: Future<Output = Result<T, ExtractError>>,
    {
        let trial = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == BreakerState::Open {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count = 0;
                    inner.trial_in_flight = false;
                    info!(breaker = %self.name, "breaker moved to half-open");
                } else {
                    return Err(ExtractError::CircuitOpen(self.name.clone()));
                }
            }
            if inner.state == BreakerState::HalfOpen {
                if inner.trial_in_flight {
                    return Err(ExtractError::CircuitOpen(self.name.clone()));
                }
                inner.trial_in_flight = true;
                true
            } else {
                false
            }
        };

        let result = fut.await;

        let mut inner = self.inner.lock().unwrap();
        if trial {
            inner.trial_in_flight = false;
        }
        match &result {
            Ok(_) => self.record_success(&mut inner),
            Err(_) => self.record_failure(&mut inner),
        }
        result
    }

    fn record_success(&self, inner: &mut BreakerInner) {
        match inner.state {
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.opened_at = None;
                    info!(breaker = %self.name, "breaker closed");
                }
            }
            _ => inner.failure_count = 0,
        }
    }

    fn record_failure(&self, inner: &mut BreakerInner) {
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(breaker = %self.name, "trial failed, breaker re-opened");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
        }
    }
}

/// The two breakers the pipeline runs its stages through.
pub struct BreakerRegistry {
    pub search: CircuitBreaker,
    pub crawl: CircuitBreaker,
}

impl BreakerRegistry {
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self {
            search: CircuitBreaker::new("search", config),
            crawl: CircuitBreaker::new("crawl", config),
        }
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        vec![self.search.snapshot(), self.crawl.snapshot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, recovery: Duration, successes: u32) -> CircuitBreaker {
        let mut cb = CircuitBreaker::new(
            "test",
            &BreakerConfig {
                failure_threshold: failures,
                recovery_timeout_s: 0,
                success_threshold: successes,
            },
        );
        cb.recovery_timeout = recovery;
        cb
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), ExtractError> {
        cb.call(async { Err::<(), _>(ExtractError::Unexpected("boom".into())) })
            .await
            .map(|_: ()| ())
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), ExtractError> {
        cb.call(async { Ok(()) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = breaker(3, Duration::from_secs(60), 1);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), BreakerState::Open);
        let err = succeed(&cb).await.unwrap_err();
        assert!(matches!(err, ExtractError::CircuitOpen(_)));
    }

    #[tokio::test]
    async fn open_calls_do_not_run_the_operation() {
        let cb = breaker(1, Duration::from_secs(60), 1);
        let _ = fail(&cb).await;
        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = cb
            .call(async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let cb = breaker(1, Duration::from_millis(20), 2);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(20), 2);
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn closed_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(60), 1);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert!(succeed(&cb).await.is_ok());
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        // Still closed: the success wiped the earlier two failures.
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
