//! Bounded, backed-off retry execution over circuit-broken operations.
//!
//! The executor never raises: every call resolves to a `RetryOutcome` the
//! caller branches on. Transient failures are retried with exponential
//! backoff and jitter; deterministic failures and an open breaker end the
//! attempt loop immediately.

use rand::Rng;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::store::{AuditEntry, AuditLog, AuditStatus, StoreError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Each delay is scaled by a random factor in [1 - ratio, 1 + ratio].
    pub jitter_ratio: f64,
    /// Hard cap on a single attempt's wall time.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.2,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Result envelope of a retried operation. `attempts` counts every attempt
/// made, including the one that succeeded or ended the loop.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub attempts: u32,
    pub result: Result<T, StoreError>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct RetryExecutor {
    breaker: Arc<CircuitBreaker>,
    audit: Arc<dyn AuditLog>,
}

impl RetryExecutor {
    pub fn new(breaker: Arc<CircuitBreaker>, audit: Arc<dyn AuditLog>) -> Self {
        Self { breaker, audit }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Runs `operation` under the named circuit breaker, retrying transient
    /// failures per `policy`. Every attempt is reported to the audit trail
    /// best-effort; audit failures are swallowed and never retried.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        policy: &RetryPolicy,
        context: &str,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let result = self
                .breaker
                .execute(operation_name, || async {
                    match tokio::time::timeout(policy.attempt_timeout, operation()).await {
                        Ok(result) => result,
                        Err(_) => Err(StoreError::Timeout {
                            operation: operation_name.to_string(),
                            duration_ms: policy.attempt_timeout.as_millis() as u64,
                        }),
                    }
                })
                .await;

            attempt += 1;

            match result {
                Ok(value) => {
                    self.report_attempt(operation_name, context, attempt, None).await;
                    return RetryOutcome {
                        attempts: attempt,
                        result: Ok(value),
                    };
                }
                Err(error) => {
                    self.report_attempt(operation_name, context, attempt, Some(&error))
                        .await;

                    if !error.is_transient() {
                        debug!(
                            operation = operation_name,
                            attempt,
                            error = %error,
                            "fatal error, not retrying"
                        );
                        return RetryOutcome {
                            attempts: attempt,
                            result: Err(error),
                        };
                    }

                    if attempt > policy.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %error,
                            "retry budget exhausted"
                        );
                        return RetryOutcome {
                            attempts: attempt,
                            result: Err(error),
                        };
                    }

                    let delay = backoff_delay(policy, attempt - 1);
                    debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Observability side channel; must never block or fail the caller.
    async fn report_attempt(
        &self,
        operation_name: &str,
        context: &str,
        attempt: u32,
        error: Option<&StoreError>,
    ) {
        let status = if error.is_some() {
            AuditStatus::Failure
        } else {
            AuditStatus::Success
        };
        let entry = AuditEntry::new(
            "retry_attempt",
            status,
            json!({
                "operation": operation_name,
                "attempt": attempt,
                "context": context,
                "error": error.map(|e| e.to_string()),
            }),
        );

        if let Err(audit_error) = self.audit.record(entry).await {
            debug!(
                operation = operation_name,
                error = %audit_error,
                "audit reporting failed, dropping attempt record"
            );
        }
    }
}

fn backoff_delay(policy: &RetryPolicy, completed_attempts: u32) -> Duration {
    let base = policy.base_delay.as_secs_f64()
        * policy.backoff_multiplier.powi(completed_attempts as i32);
    let capped = base.min(policy.max_delay.as_secs_f64());

    let factor = if policy.jitter_ratio > 0.0 {
        let spread = policy.jitter_ratio;
        1.0 + rand::rng().random_range(-spread..=spread)
    } else {
        1.0
    };

    Duration::from_secs_f64((capped * factor).max(0.0))
}
