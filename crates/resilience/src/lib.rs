pub mod breaker;
pub mod classify;
pub mod ratelimit;
pub mod recovery;
pub mod retry;

pub use breaker::{BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use classify::{classify, is_retryable, FailureClass};
pub use ratelimit::{BucketStatus, RateLimiters, TokenBucket};
pub use recovery::{attempt_recovery, name_variants, RecoveryPlan};
pub use retry::{execute_with_retry, run_resilient, RetryPolicy};
