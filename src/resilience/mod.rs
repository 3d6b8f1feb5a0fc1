//! Failure-handling wrappers for calls to external collaborators: a
//! per-operation-class circuit breaker and a retry executor that drives it.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
