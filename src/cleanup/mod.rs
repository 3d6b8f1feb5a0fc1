//! Retention cleanup: configuration, run records, and the background
//! scheduler that purges aged audit, error, and notification records.

pub mod scheduler;

pub use scheduler::RetentionScheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Retention windows and scheduling knobs. Mutable at runtime via
/// `RetentionScheduler::update_config`; changing the interval or the
/// enabled flag restarts or stops the timer loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub audit_log_retention_days: u32,
    pub error_retention_days: u32,
    pub notification_retention_days: u32,
    pub interval_hours: u32,
    pub enabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            audit_log_retention_days: 90,
            error_retention_days: 30,
            notification_retention_days: 30,
            interval_hours: 24,
            enabled: true,
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_hours) * 3600)
    }
}

/// Partial config update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupConfigPatch {
    pub audit_log_retention_days: Option<u32>,
    pub error_retention_days: Option<u32>,
    pub notification_retention_days: Option<u32>,
    pub interval_hours: Option<u32>,
    pub enabled: Option<bool>,
}

impl CleanupConfig {
    pub fn apply(&mut self, patch: CleanupConfigPatch) {
        if let Some(days) = patch.audit_log_retention_days {
            self.audit_log_retention_days = days;
        }
        if let Some(days) = patch.error_retention_days {
            self.error_retention_days = days;
        }
        if let Some(days) = patch.notification_retention_days {
            self.notification_retention_days = days;
        }
        if let Some(hours) = patch.interval_hours {
            // A zero interval would spin the timer loop back-to-back.
            self.interval_hours = hours.max(1);
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
    }
}

/// Result of one cleanup run. Kept in the scheduler's "last run" slot only;
/// persisting run records is a collaborator concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRun {
    pub started_at: DateTime<Utc>,
    pub audit_logs_deleted: u64,
    pub errors_deleted: u64,
    pub notifications_deleted: u64,
    pub duration_ms: u64,
    pub success: bool,
    pub errors: Vec<String>,
}

/// Dry-run counts: what a cleanup would delete right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupEstimate {
    pub audit_logs: u64,
    pub error_records: u64,
    pub notifications: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupStatus {
    pub is_running: bool,
    pub cleanup_in_flight: bool,
    pub last_cleanup: Option<CleanupRun>,
    pub next_cleanup: Option<DateTime<Utc>>,
    pub config: CleanupConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CleanupError {
    #[error("a cleanup run is already in flight")]
    AlreadyRunning,
}
