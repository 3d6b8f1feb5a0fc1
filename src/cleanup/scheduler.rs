//! Background retention cleanup scheduler.
//!
//! One timer loop per scheduler instance, spawned on `start()` and stopped
//! through a cancellation token. At most one cleanup run is in flight at a
//! time: the loop takes the run guard and waits its turn, a manual
//! `force_cleanup` that finds the guard taken is rejected instead of
//! queued. Lifecycle is explicit; nothing starts at module load.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{CleanupConfig, CleanupConfigPatch, CleanupError, CleanupEstimate, CleanupRun, CleanupStatus};
use crate::store::{AuditLog, ErrorStore, NotificationDispatcher};

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct SchedulerInner {
    audit: Arc<dyn AuditLog>,
    error_store: Arc<dyn ErrorStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    config: Mutex<CleanupConfig>,
    /// At-most-one-run-in-flight guard.
    run_guard: tokio::sync::Mutex<()>,
    last_run: Mutex<Option<CleanupRun>>,
    next_run_at: Mutex<Option<chrono::DateTime<Utc>>>,
    timer: Mutex<Option<LoopHandle>>,
}

#[derive(Clone)]
pub struct RetentionScheduler {
    inner: Arc<SchedulerInner>,
}

impl RetentionScheduler {
    pub fn new(
        audit: Arc<dyn AuditLog>,
        error_store: Arc<dyn ErrorStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        mut config: CleanupConfig,
    ) -> Self {
        // A zero interval would spin the timer loop back-to-back.
        config.interval_hours = config.interval_hours.max(1);
        Self {
            inner: Arc::new(SchedulerInner {
                audit,
                error_store,
                notifier,
                config: Mutex::new(config),
                run_guard: tokio::sync::Mutex::new(()),
                last_run: Mutex::new(None),
                next_run_at: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Starts the timer loop. Idempotent: calling while running logs and
    /// returns. When the config is disabled, nothing is scheduled. The
    /// first cleanup runs immediately; its errors are caught and logged,
    /// never propagated.
    pub fn start(&self) {
        let mut timer = self.inner.timer.lock().unwrap();
        if timer.is_some() {
            info!("retention scheduler already running, start ignored");
            return;
        }

        let config = self.inner.config.lock().unwrap().clone();
        if !config.enabled {
            info!("retention cleanup disabled, not scheduling");
            return;
        }

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            run_loop(inner, loop_cancel).await;
        });

        *timer = Some(LoopHandle { cancel, task });
        info!(interval_hours = config.interval_hours, "retention scheduler started");
    }

    /// Stops the timer loop and waits for it to wind down. Idempotent. A
    /// cleanup run already in flight finishes before the loop exits.
    pub async fn stop(&self) {
        let taken = self.inner.timer.lock().unwrap().take();
        match taken {
            Some(LoopHandle { cancel, task }) => {
                cancel.cancel();
                if let Err(join_error) = task.await {
                    warn!(error = %join_error, "retention scheduler task ended abnormally");
                }
                *self.inner.next_run_at.lock().unwrap() = None;
                info!("retention scheduler stopped");
            }
            None => info!("retention scheduler not running, stop ignored"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.timer.lock().unwrap().is_some()
    }

    /// Out-of-band cleanup run for manual/administrative invocation.
    /// Rejected when a run (scheduled or forced) is already in flight.
    pub async fn force_cleanup(&self) -> Result<CleanupRun, CleanupError> {
        let _guard = self
            .inner
            .run_guard
            .try_lock()
            .map_err(|_| CleanupError::AlreadyRunning)?;

        info!("manual cleanup run triggered");
        Ok(run_and_record(&self.inner).await)
    }

    /// Counts what a run would delete right now, without deleting.
    pub async fn estimate_cleanup(&self) -> CleanupEstimate {
        let config = self.inner.config.lock().unwrap().clone();
        let now = Utc::now();
        let mut estimate = CleanupEstimate {
            audit_logs: 0,
            error_records: 0,
            notifications: 0,
            errors: Vec::new(),
        };

        let audit_cutoff = now - chrono::Duration::days(i64::from(config.audit_log_retention_days));
        match self.inner.audit.count_older_than(audit_cutoff).await {
            Ok(count) => estimate.audit_logs = count,
            Err(e) => estimate.errors.push(format!("audit logs: {e}")),
        }

        let error_cutoff = now - chrono::Duration::days(i64::from(config.error_retention_days));
        match self.inner.error_store.count_older_than(error_cutoff).await {
            Ok(count) => estimate.error_records = count,
            Err(e) => estimate.errors.push(format!("error records: {e}")),
        }

        let notification_cutoff =
            now - chrono::Duration::days(i64::from(config.notification_retention_days));
        match self.inner.notifier.count_older_than(notification_cutoff).await {
            Ok(count) => estimate.notifications = count,
            Err(e) => estimate.errors.push(format!("notifications: {e}")),
        }

        estimate
    }

    /// Merges a partial config. Restart semantics: interval change while
    /// running restarts the loop; disabling stops it; enabling while
    /// stopped starts it.
    pub async fn update_config(&self, patch: CleanupConfigPatch) {
        let (old, new) = {
            let mut config = self.inner.config.lock().unwrap();
            let old = config.clone();
            config.apply(patch);
            (old, config.clone())
        };

        info!(?new, "cleanup config updated");
        let running = self.is_running();

        if running && !new.enabled {
            self.stop().await;
        } else if running && new.interval_hours != old.interval_hours {
            info!(
                old_interval = old.interval_hours,
                new_interval = new.interval_hours,
                "cleanup interval changed, restarting scheduler"
            );
            self.stop().await;
            self.start();
        } else if !running && new.enabled && !old.enabled {
            self.start();
        }
    }

    pub fn config(&self) -> CleanupConfig {
        self.inner.config.lock().unwrap().clone()
    }

    pub fn status(&self) -> CleanupStatus {
        CleanupStatus {
            is_running: self.is_running(),
            cleanup_in_flight: self.inner.run_guard.try_lock().is_err(),
            last_cleanup: self.inner.last_run.lock().unwrap().clone(),
            next_cleanup: *self.inner.next_run_at.lock().unwrap(),
            config: self.config(),
        }
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, cancel: CancellationToken) {
    // Immediate run on start; errors are recorded in the run, not raised.
    {
        let _guard = inner.run_guard.lock().await;
        run_and_record(&inner).await;
    }

    loop {
        let interval = inner.config.lock().unwrap().interval();
        *inner.next_run_at.lock().unwrap() = Some(
            Utc::now()
                + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::hours(24)),
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = tokio::time::sleep(interval) => {
                let _guard = inner.run_guard.lock().await;
                run_and_record(&inner).await;
            }
        }
    }
}

/// Executes one cleanup run. Caller must hold the run guard. The three
/// category purges are independent: one failing is recorded in the run's
/// error list and does not stop the others.
async fn run_and_record(inner: &SchedulerInner) -> CleanupRun {
    let config = inner.config.lock().unwrap().clone();
    let started = std::time::Instant::now();
    let now = Utc::now();

    let mut run = CleanupRun {
        started_at: now,
        audit_logs_deleted: 0,
        errors_deleted: 0,
        notifications_deleted: 0,
        duration_ms: 0,
        success: false,
        errors: Vec::new(),
    };

    // Exclusive cutoff: only records strictly older than now - retention
    // are deleted; a record at exactly the boundary survives.
    let audit_cutoff = now - chrono::Duration::days(i64::from(config.audit_log_retention_days));
    match inner.audit.purge_older_than(audit_cutoff).await {
        Ok(deleted) => run.audit_logs_deleted = deleted,
        Err(e) => {
            error!(error = %e, "audit log cleanup failed");
            run.errors.push(format!("audit logs: {e}"));
        }
    }

    let error_cutoff = now - chrono::Duration::days(i64::from(config.error_retention_days));
    match inner.error_store.purge_older_than(error_cutoff).await {
        Ok(deleted) => run.errors_deleted = deleted,
        Err(e) => {
            error!(error = %e, "error record cleanup failed");
            run.errors.push(format!("error records: {e}"));
        }
    }

    let notification_cutoff =
        now - chrono::Duration::days(i64::from(config.notification_retention_days));
    match inner.notifier.purge_older_than(notification_cutoff).await {
        Ok(deleted) => run.notifications_deleted = deleted,
        Err(e) => {
            error!(error = %e, "notification cleanup failed");
            run.errors.push(format!("notifications: {e}"));
        }
    }

    run.duration_ms = started.elapsed().as_millis() as u64;
    run.success = run.errors.is_empty();

    info!(
        audit_logs = run.audit_logs_deleted,
        error_records = run.errors_deleted,
        notifications = run.notifications_deleted,
        duration_ms = run.duration_ms,
        success = run.success,
        "cleanup run completed"
    );

    *inner.last_run.lock().unwrap() = Some(run.clone());
    run
}
