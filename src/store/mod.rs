//! Collaborator interfaces consumed by the workflow and cleanup layers.
//!
//! The content repository, audit trail, error store and notification
//! dispatcher are external systems; this module defines the traits the core
//! talks through and the shared error taxonomy used to classify their
//! failures as retryable or fatal.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::item::{Priority, WorkItem, WorkItemFilter, WorkItemPatch};

/// Failure taxonomy for collaborator calls.
///
/// `is_transient` decides retry eligibility: transient errors are retried by
/// the executor and count toward the circuit breaker; everything else is
/// deterministic and surfaced immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("circuit open for operation class '{operation}'")]
    CircuitOpen { operation: String },
}

impl StoreError {
    /// Transient errors are worth another attempt; everything else either
    /// cannot succeed on retry (not-found, validation, stale version) or is
    /// the breaker telling us to back off entirely.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited { .. }
                | StoreError::Timeout { .. }
                | StoreError::Unavailable(_)
                | StoreError::Network(_)
        )
    }
}

/// The external content repository. Persists work items; the workflow
/// engine treats it as the single source of truth and never caches beyond
/// one operation.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<WorkItem, StoreError>;

    async fn create(&self, item: WorkItem) -> Result<WorkItem, StoreError>;

    /// Applies a partial update. `expected_version` is the optimistic
    /// concurrency token observed at read time; the store rejects the patch
    /// with `VersionConflict` when the stored version has moved on.
    async fn patch(
        &self,
        id: &str,
        expected_version: u64,
        update: WorkItemPatch,
    ) -> Result<WorkItem, StoreError>;

    async fn list(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// One record in the append-only operational audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub kind: String,
    pub status: AuditStatus,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    pub fn new(kind: impl Into<String>, status: AuditStatus, metadata: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            status,
            timestamp: Utc::now(),
            user_id: None,
            metadata,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Operational audit trail. Recording is best-effort everywhere in the
/// core: a failure here is logged and swallowed, never escalated.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Deletes entries strictly older than `cutoff`, returning how many
    /// were removed. Entries timestamped exactly at the cutoff are kept.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Captured operation failure, retained for diagnostics until retention
/// cleanup purges it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub message: String,
    pub work_item_id: Option<String>,
}

impl ErrorRecord {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation: operation.into(),
            message: message.into(),
            work_item_id: None,
        }
    }

    pub fn for_work_item(mut self, id: impl Into<String>) -> Self {
        self.work_item_id = Some(id.into());
        self
    }
}

#[async_trait]
pub trait ErrorStore: Send + Sync {
    async fn record(&self, record: ErrorRecord) -> Result<(), StoreError>;

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StatusChanged,
    CommentAdded,
    Reassigned,
    ReviewRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Authors,
    Editors,
    Admins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub recipient_role: RecipientRole,
    pub related_work_item_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
        recipient_role: RecipientRole,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            priority,
            recipient_role,
            related_work_item_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_work_item(mut self, id: impl Into<String>) -> Self {
        self.related_work_item_id = Some(id.into());
        self
    }
}

/// Outbound notification channel. Delivery retries, if any, belong to the
/// dispatcher itself; the workflow engine fires and forgets.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), StoreError>;

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
