//! Consecutive-failure circuit breaker, keyed by operation class.
//!
//! Each operation name ("contentStore.read", "contentStore.write", ...)
//! gets its own independent state machine, so a failing write path does not
//! take reads down with it. All state lives behind one mutex; transitions
//! for a given name are strictly ordered and callers never observe a torn
//! state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive transient failures that flip the breaker open.
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before allowing a trial.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: u32,
    /// Monotonic clock for cooldown math (plays well with paused test time).
    last_failure_instant: Option<Instant>,
    /// Wall clock, reported in snapshots.
    last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure_instant: None,
            last_failure_at: None,
        }
    }
}

/// Point-in-time view of one operation class, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    states: Mutex<HashMap<String, BreakerEntry>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `operation` under the breaker for `name`.
    ///
    /// While open and inside the cooldown window this returns
    /// `StoreError::CircuitOpen` without invoking the operation at all. Once
    /// the cooldown elapses the next call goes through as a half-open trial:
    /// success closes the breaker, a transient failure re-opens it and
    /// restarts the cooldown clock. Deterministic failures (not-found,
    /// validation, stale version) are proof the dependency answered, so they
    /// do not count against it.
    pub async fn execute<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.preflight(name)?;

        match operation().await {
            Ok(value) => {
                self.record_success(name);
                Ok(value)
            }
            Err(error) => {
                if error.is_transient() {
                    self.record_failure(name);
                } else {
                    self.record_deterministic_response(name);
                }
                Err(error)
            }
        }
    }

    /// Gate check before an attempt. Transitions open -> half-open when the
    /// cooldown has elapsed.
    fn preflight(&self, name: &str) -> Result<(), StoreError> {
        let mut states = self.states.lock().unwrap();
        let entry = states.entry(name.to_string()).or_insert_with(BreakerEntry::new);

        match entry.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let cooled_down = entry
                    .last_failure_instant
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);

                if cooled_down {
                    info!(operation = name, "circuit breaker allowing half-open trial");
                    entry.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    debug!(operation = name, "circuit breaker rejecting call while open");
                    Err(StoreError::CircuitOpen {
                        operation: name.to_string(),
                    })
                }
            }
        }
    }

    fn record_success(&self, name: &str) {
        let mut states = self.states.lock().unwrap();
        let entry = states.entry(name.to_string()).or_insert_with(BreakerEntry::new);

        if entry.state != BreakerState::Closed {
            info!(operation = name, "circuit breaker closed after successful trial");
        }
        entry.state = BreakerState::Closed;
        entry.consecutive_failures = 0;
    }

    fn record_failure(&self, name: &str) {
        let mut states = self.states.lock().unwrap();
        let entry = states.entry(name.to_string()).or_insert_with(BreakerEntry::new);

        entry.consecutive_failures += 1;
        entry.last_failure_instant = Some(Instant::now());
        entry.last_failure_at = Some(Utc::now());

        let should_open = entry.state == BreakerState::HalfOpen
            || entry.consecutive_failures >= self.config.failure_threshold;

        if should_open {
            if entry.state != BreakerState::Open {
                warn!(
                    operation = name,
                    consecutive_failures = entry.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            entry.state = BreakerState::Open;
        }
    }

    /// A deterministic error means the dependency responded; a half-open
    /// trial that gets one counts as recovery.
    fn record_deterministic_response(&self, name: &str) {
        let mut states = self.states.lock().unwrap();
        let entry = states.entry(name.to_string()).or_insert_with(BreakerEntry::new);

        if entry.state == BreakerState::HalfOpen {
            info!(operation = name, "circuit breaker closed after deterministic trial response");
            entry.state = BreakerState::Closed;
            entry.consecutive_failures = 0;
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<BreakerSnapshot> {
        let states = self.states.lock().unwrap();
        states.get(name).map(|entry| BreakerSnapshot {
            name: name.to_string(),
            state: entry.state,
            consecutive_failures: entry.consecutive_failures,
            last_failure_at: entry.last_failure_at,
        })
    }

    pub fn snapshot_all(&self) -> Vec<BreakerSnapshot> {
        let states = self.states.lock().unwrap();
        let mut snapshots: Vec<BreakerSnapshot> = states
            .iter()
            .map(|(name, entry)| BreakerSnapshot {
                name: name.clone(),
                state: entry.state,
                consecutive_failures: entry.consecutive_failures,
                last_failure_at: entry.last_failure_at,
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    fn transient() -> StoreError {
        StoreError::Network("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_opens_exactly_at_threshold() {
        let breaker = breaker(3, 30);

        for _ in 0..2 {
            let _ = breaker
                .execute("x", || async { Err::<(), _>(transient()) })
                .await;
            assert_eq!(breaker.snapshot("x").unwrap().state, BreakerState::Closed);
        }

        let _ = breaker
            .execute("x", || async { Err::<(), _>(transient()) })
            .await;
        assert_eq!(breaker.snapshot("x").unwrap().state, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_invoking_operation() {
        let breaker = breaker(3, 30);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = breaker
                .execute("x", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient())
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result = breaker
            .execute("x", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(StoreError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_after_cooldown_closes_on_success() {
        let breaker = breaker(2, 30);

        for _ in 0..2 {
            let _ = breaker
                .execute("x", || async { Err::<(), _>(transient()) })
                .await;
        }
        assert_eq!(breaker.snapshot("x").unwrap().state, BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        let result = breaker.execute("x", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let snapshot = breaker.snapshot("x").unwrap();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_resets_cooldown() {
        let breaker = breaker(2, 30);

        for _ in 0..2 {
            let _ = breaker
                .execute("x", || async { Err::<(), _>(transient()) })
                .await;
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = breaker
            .execute("x", || async { Err::<(), _>(transient()) })
            .await;
        assert_eq!(breaker.snapshot("x").unwrap().state, BreakerState::Open);

        // Cooldown restarted at the failed trial; still rejecting shortly after.
        tokio::time::advance(Duration::from_secs(10)).await;
        let result = breaker.execute("x", || async { Ok(()) }).await;
        assert!(matches!(result, Err(StoreError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_operation_classes_fail_independently() {
        let breaker = breaker(1, 30);

        let _ = breaker
            .execute("contentStore.write", || async { Err::<(), _>(transient()) })
            .await;
        assert_eq!(
            breaker.snapshot("contentStore.write").unwrap().state,
            BreakerState::Open
        );

        let result = breaker
            .execute("contentStore.read", || async { Ok(1) })
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count_while_closed() {
        let breaker = breaker(3, 30);

        for _ in 0..2 {
            let _ = breaker
                .execute("x", || async { Err::<(), _>(transient()) })
                .await;
        }
        assert_eq!(breaker.snapshot("x").unwrap().consecutive_failures, 2);

        let _ = breaker.execute("x", || async { Ok(()) }).await;
        assert_eq!(breaker.snapshot("x").unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_deterministic_errors_do_not_trip_the_breaker() {
        let breaker = breaker(2, 30);

        for _ in 0..5 {
            let _ = breaker
                .execute("x", || async {
                    Err::<(), _>(StoreError::NotFound("gone".to_string()))
                })
                .await;
        }
        assert_eq!(breaker.snapshot("x").unwrap().state, BreakerState::Closed);
    }
}
