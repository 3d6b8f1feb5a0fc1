//! Integration tests for the retention cleanup scheduler: cutoff behavior,
//! per-category error isolation, the at-most-one-run guard, and the
//! start/stop lifecycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use copydesk::cleanup::{CleanupConfig, CleanupConfigPatch, CleanupError, RetentionScheduler};
use copydesk::store::memory::{
    InMemoryAuditLog, InMemoryErrorStore, InMemoryNotificationDispatcher,
};
use copydesk::store::{
    AuditEntry, AuditLog, AuditStatus, ErrorRecord, Notification, NotificationKind, StoreError,
};
use copydesk::workflow::Priority;

fn audit_entry() -> AuditEntry {
    AuditEntry::new("workflow.change_status", AuditStatus::Success, serde_json::json!({}))
}

fn error_record() -> ErrorRecord {
    ErrorRecord::new("contentStore.write", "connection reset")
}

fn notification() -> Notification {
    Notification::new(
        NotificationKind::StatusChanged,
        "subject",
        "body",
        Priority::Medium,
        copydesk::store::RecipientRole::Authors,
    )
}

struct Stores {
    audit: Arc<InMemoryAuditLog>,
    errors: Arc<InMemoryErrorStore>,
    notifier: Arc<InMemoryNotificationDispatcher>,
}

fn stores() -> Stores {
    Stores {
        audit: Arc::new(InMemoryAuditLog::new()),
        errors: Arc::new(InMemoryErrorStore::new()),
        notifier: Arc::new(InMemoryNotificationDispatcher::new()),
    }
}

fn scheduler_with(stores: &Stores, config: CleanupConfig) -> RetentionScheduler {
    RetentionScheduler::new(
        stores.audit.clone(),
        stores.errors.clone(),
        stores.notifier.clone(),
        config,
    )
}

#[tokio::test]
async fn test_retention_cutoff_is_exclusive() {
    let stores = stores();
    let now = Utc::now();

    // 90-day audit retention: a 91-day-old entry goes, an 89-day-old stays.
    stores.audit.seed(audit_entry(), now - chrono::Duration::days(91));
    stores.audit.seed(audit_entry(), now - chrono::Duration::days(89));

    // 30-day windows for errors and notifications.
    stores.errors.seed(error_record(), now - chrono::Duration::days(31));
    stores.errors.seed(error_record(), now - chrono::Duration::days(29));
    stores.notifier.seed(notification(), now - chrono::Duration::days(31));
    stores.notifier.seed(notification(), now - chrono::Duration::days(29));

    let scheduler = scheduler_with(&stores, CleanupConfig::default());
    let run = scheduler.force_cleanup().await.unwrap();

    assert!(run.success);
    assert_eq!(run.audit_logs_deleted, 1);
    assert_eq!(run.errors_deleted, 1);
    assert_eq!(run.notifications_deleted, 1);
    assert_eq!(stores.audit.entries().len(), 1);
    assert_eq!(stores.errors.records().len(), 1);
    assert_eq!(stores.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_category_failures_are_isolated() {
    let stores = stores();
    let now = Utc::now();
    stores.audit.seed(audit_entry(), now - chrono::Duration::days(100));
    stores.notifier.seed(notification(), now - chrono::Duration::days(100));

    stores
        .errors
        .inject_failure(StoreError::Unavailable("error store down".to_string()));

    let scheduler = scheduler_with(&stores, CleanupConfig::default());
    let run = scheduler.force_cleanup().await.unwrap();

    // The failed category is reported; the other two still ran.
    assert!(!run.success);
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].contains("error records"));
    assert_eq!(run.audit_logs_deleted, 1);
    assert_eq!(run.notifications_deleted, 1);
}

#[tokio::test]
async fn test_estimate_counts_without_deleting() {
    let stores = stores();
    let now = Utc::now();
    stores.audit.seed(audit_entry(), now - chrono::Duration::days(100));
    stores.audit.seed(audit_entry(), now - chrono::Duration::days(10));

    let scheduler = scheduler_with(&stores, CleanupConfig::default());
    let estimate = scheduler.estimate_cleanup().await;

    assert_eq!(estimate.audit_logs, 1);
    assert_eq!(stores.audit.entries().len(), 2);
}

/// Audit log whose purge blocks until released, to hold a cleanup run in
/// flight deterministically.
struct BlockingAuditLog {
    inner: InMemoryAuditLog,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl AuditLog for BlockingAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.inner.record(entry).await
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.purge_older_than(cutoff).await
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.count_older_than(cutoff).await
    }
}

#[tokio::test]
async fn test_concurrent_force_cleanup_is_rejected() {
    let audit = Arc::new(BlockingAuditLog {
        inner: InMemoryAuditLog::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let scheduler = RetentionScheduler::new(
        audit.clone(),
        Arc::new(InMemoryErrorStore::new()),
        Arc::new(InMemoryNotificationDispatcher::new()),
        CleanupConfig::default(),
    );

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.force_cleanup().await })
    };

    // Wait until the first run is inside its purge, then try a second.
    audit.entered.notified().await;
    assert!(scheduler.status().cleanup_in_flight);
    let second = scheduler.force_cleanup().await;
    assert_eq!(second.unwrap_err(), CleanupError::AlreadyRunning);

    audit.release.notify_one();
    let run = first.await.unwrap().unwrap();
    assert!(run.success);
    assert!(!scheduler.status().cleanup_in_flight);
}

#[tokio::test]
async fn test_start_runs_immediately_and_is_idempotent() {
    let stores = stores();
    let now = Utc::now();
    stores.audit.seed(audit_entry(), now - chrono::Duration::days(100));

    let scheduler = scheduler_with(&stores, CleanupConfig::default());
    scheduler.start();
    assert!(scheduler.is_running());

    // Second start is a no-op.
    scheduler.start();
    assert!(scheduler.is_running());

    // Give the spawned loop its immediate first run.
    for _ in 0..20 {
        if stores.audit.entries().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stores.audit.entries().is_empty());
    assert!(scheduler.status().next_cleanup.is_some());

    scheduler.stop().await;
    assert!(!scheduler.is_running());

    // Second stop is also a no-op.
    scheduler.stop().await;
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_zero_interval_config_is_clamped_at_construction() {
    let stores = stores();
    let scheduler = scheduler_with(
        &stores,
        CleanupConfig {
            interval_hours: 0,
            enabled: false,
            ..Default::default()
        },
    );

    assert_eq!(scheduler.config().interval_hours, 1);
}

#[tokio::test]
async fn test_disabled_config_does_not_schedule() {
    let stores = stores();
    let scheduler = scheduler_with(
        &stores,
        CleanupConfig {
            enabled: false,
            ..Default::default()
        },
    );

    scheduler.start();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_enabling_via_config_update_starts_the_loop() {
    let stores = stores();
    let scheduler = scheduler_with(
        &stores,
        CleanupConfig {
            enabled: false,
            ..Default::default()
        },
    );
    scheduler.start();
    assert!(!scheduler.is_running());

    scheduler
        .update_config(CleanupConfigPatch {
            enabled: Some(true),
            ..Default::default()
        })
        .await;
    assert!(scheduler.is_running());
    assert!(scheduler.config().enabled);

    scheduler
        .update_config(CleanupConfigPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .await;
    assert!(!scheduler.is_running());

    scheduler.stop().await;
}

#[tokio::test]
async fn test_interval_change_restarts_the_loop() {
    let stores = stores();
    let scheduler = scheduler_with(&stores, CleanupConfig::default());
    scheduler.start();
    assert!(scheduler.is_running());

    scheduler
        .update_config(CleanupConfigPatch {
            interval_hours: Some(6),
            ..Default::default()
        })
        .await;
    assert!(scheduler.is_running());
    assert_eq!(scheduler.config().interval_hours, 6);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_stop_waits_for_inflight_run() {
    let audit = Arc::new(BlockingAuditLog {
        inner: InMemoryAuditLog::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let scheduler = RetentionScheduler::new(
        audit.clone(),
        Arc::new(InMemoryErrorStore::new()),
        Arc::new(InMemoryNotificationDispatcher::new()),
        CleanupConfig::default(),
    );

    scheduler.start();
    // The immediate first run blocks inside the purge.
    audit.entered.notified().await;

    let stop = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.stop().await })
    };

    // Stop cannot complete until the run is released.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!stop.is_finished());

    audit.release.notify_one();
    stop.await.unwrap();
    assert!(!scheduler.is_running());
    assert!(scheduler.status().last_cleanup.is_some());
}
