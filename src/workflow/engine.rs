//! Content-review workflow engine.
//!
//! Drives work items through the editorial state machine. Every read and
//! write against the content store goes through the retry executor and its
//! circuit breaker; audit logging and notification dispatch sit off the
//! critical path and are best-effort. The read-modify-write cycle is
//! protected by the work item's optimistic version token: a stale write is
//! rejected by the store and the whole cycle is retried a bounded number of
//! times.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::resilience::{CircuitBreaker, RetryExecutor, RetryPolicy};
use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::store::{
    AuditEntry, AuditLog, AuditStatus, ContentStore, ErrorRecord, ErrorStore, Notification,
    NotificationDispatcher, NotificationKind, RecipientRole, StoreError,
};
use crate::workflow::item::{
    BulkAction, Comment, CommentKind, HistoryEntry, WorkItem, WorkItemFilter, WorkItemPatch,
    WorkItemStatus, WorkflowAction,
};

/// Breaker/retry operation classes. Reads and writes fail independently.
pub const OP_CONTENT_READ: &str = "contentStore.read";
pub const OP_CONTENT_WRITE: &str = "contentStore.write";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid transition: {action} not allowed from {from}")]
    InvalidTransition {
        from: WorkItemStatus,
        action: WorkflowAction,
    },

    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation failed after {attempts} attempt(s): {source}")]
    OperationFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

/// Options for `change_status`. `publish_immediately` collapses an approval
/// straight into `published` in a single transition (one history entry,
/// action `approve`). `effective_at` records the go-live time of a
/// scheduled publish in the history notes.
#[derive(Debug, Clone, Default)]
pub struct ChangeStatusOptions {
    pub publish_immediately: bool,
    pub effective_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorInfo {
    pub editor_id: String,
    pub notes: Option<String>,
}

/// Whether a bulk action tolerates per-id failures or validates the whole
/// batch up front and refuses to touch anything on the first invalid item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkPolicy {
    PartialSuccess,
    AllOrNothing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkError {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub processed: u32,
    pub errors: Vec<BulkError>,
}

pub struct WorkflowEngine {
    store: Arc<dyn ContentStore>,
    audit: Arc<dyn AuditLog>,
    error_store: Arc<dyn ErrorStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    retry: RetryExecutor,
    policy: RetryPolicy,
    bulk_policy: BulkPolicy,
    /// Bounded re-reads when a write loses the optimistic version race.
    max_conflict_rounds: u32,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        audit: Arc<dyn AuditLog>,
        error_store: Arc<dyn ErrorStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        breaker: Arc<CircuitBreaker>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            audit: audit.clone(),
            error_store,
            notifier,
            retry: RetryExecutor::new(breaker, audit),
            policy,
            bulk_policy: BulkPolicy::PartialSuccess,
            max_conflict_rounds: 3,
        }
    }

    pub fn with_bulk_policy(mut self, policy: BulkPolicy) -> Self {
        self.bulk_policy = policy;
        self
    }

    pub fn with_max_conflict_rounds(mut self, rounds: u32) -> Self {
        self.max_conflict_rounds = rounds;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.retry.breaker()
    }

    pub async fn create_work_item(&self, item: WorkItem) -> Result<WorkItem, WorkflowError> {
        let outcome = self
            .retry
            .execute(OP_CONTENT_WRITE, &self.policy, &item.id, || {
                self.store.create(item.clone())
            })
            .await;

        match outcome.result {
            Ok(created) => {
                info!(work_item = %created.id, title = %created.title, "work item created");
                self.log_action("workflow.create", &created.id, None, AuditStatus::Success, json!({}))
                    .await;
                Ok(created)
            }
            Err(error) => {
                self.record_operation_failure("workflow.create", &item.id, &error)
                    .await;
                Err(self.map_store_error(error, outcome.attempts))
            }
        }
    }

    pub async fn list_work_items(
        &self,
        filter: &WorkItemFilter,
    ) -> Result<Vec<WorkItem>, WorkflowError> {
        let outcome = self
            .retry
            .execute(OP_CONTENT_READ, &self.policy, "list", || {
                self.store.list(filter)
            })
            .await;

        outcome
            .result
            .map_err(|error| self.map_store_error(error, outcome.attempts))
    }

    pub async fn get_work_item(&self, id: &str) -> Result<WorkItem, WorkflowError> {
        self.read_item(id).await
    }

    /// Validates and applies a workflow action against the transition
    /// table, appending exactly one history entry. On failure the work item
    /// is left unchanged; invalid transitions are deterministic and never
    /// retried.
    pub async fn change_status(
        &self,
        id: &str,
        action: WorkflowAction,
        performed_by: &str,
        notes: Option<String>,
    ) -> Result<WorkItem, WorkflowError> {
        self.change_status_with(id, action, performed_by, notes, ChangeStatusOptions::default())
            .await
    }

    pub async fn change_status_with(
        &self,
        id: &str,
        action: WorkflowAction,
        performed_by: &str,
        notes: Option<String>,
        options: ChangeStatusOptions,
    ) -> Result<WorkItem, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("change_status", Some(id), Some(&correlation_id));
        self.apply_status_change(id, action, performed_by, notes, options)
            .instrument(span)
            .await
    }

    async fn apply_status_change(
        &self,
        id: &str,
        action: WorkflowAction,
        performed_by: &str,
        notes: Option<String>,
        options: ChangeStatusOptions,
    ) -> Result<WorkItem, WorkflowError> {
        let mut conflict_rounds = 0;

        loop {
            let item = self.read_item(id).await?;
            let from = item.status;

            let mut next = action.next_status(from).ok_or(WorkflowError::InvalidTransition {
                from,
                action,
            })?;
            if next == WorkItemStatus::Approved && options.publish_immediately {
                next = WorkItemStatus::Published;
            }

            let mut entry_notes = notes.clone();
            if action == WorkflowAction::PublishScheduled {
                if let Some(at) = options.effective_at {
                    let scheduled = format!("effective at {}", at.to_rfc3339());
                    entry_notes = Some(match entry_notes {
                        Some(existing) => format!("{existing} ({scheduled})"),
                        None => scheduled,
                    });
                }
            }

            let patch = WorkItemPatch {
                status: Some(next),
                append_history: vec![HistoryEntry::new(action.into(), performed_by, entry_notes)],
                ..Default::default()
            };

            let outcome = self
                .retry
                .execute(OP_CONTENT_WRITE, &self.policy, id, || {
                    self.store.patch(id, item.version, patch.clone())
                })
                .await;

            match outcome.result {
                Ok(updated) => {
                    info!(
                        work_item = %id,
                        from = %from,
                        to = %updated.status,
                        action = %action,
                        performed_by,
                        "work item status changed"
                    );
                    self.log_action(
                        "workflow.change_status",
                        id,
                        Some(performed_by),
                        AuditStatus::Success,
                        json!({ "from": from, "to": updated.status, "action": action }),
                    )
                    .await;
                    self.notify_status_change(&updated, action).await;
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { found, expected, .. })
                    if conflict_rounds < self.max_conflict_rounds =>
                {
                    conflict_rounds += 1;
                    debug!(
                        work_item = %id,
                        expected,
                        found,
                        round = conflict_rounds,
                        "version conflict, re-reading work item"
                    );
                }
                Err(error) => {
                    self.log_action(
                        "workflow.change_status",
                        id,
                        Some(performed_by),
                        AuditStatus::Failure,
                        json!({ "action": action, "error": error.to_string() }),
                    )
                    .await;
                    self.record_operation_failure("workflow.change_status", id, &error)
                        .await;
                    return Err(self.map_store_error(error, outcome.attempts));
                }
            }
        }
    }

    /// Updates assignment fields and appends a `reassigned` history entry.
    /// Status is untouched. Fields passed as `None` are left as they are.
    pub async fn update_assignments(
        &self,
        id: &str,
        assigned_to: Option<String>,
        reviewer: Option<String>,
        performed_by: &str,
    ) -> Result<WorkItem, WorkflowError> {
        if assigned_to.is_none() && reviewer.is_none() {
            return Err(WorkflowError::Validation(
                "no assignment changes requested".to_string(),
            ));
        }

        let mut conflict_rounds = 0;

        loop {
            let item = self.read_item(id).await?;

            let mut changes = Vec::new();
            if let Some(assignee) = &assigned_to {
                changes.push(format!("assigned to {assignee}"));
            }
            if let Some(reviewer) = &reviewer {
                changes.push(format!("reviewer {reviewer}"));
            }

            let patch = WorkItemPatch {
                assigned_to: assigned_to.clone().map(Some),
                reviewer: reviewer.clone().map(Some),
                append_history: vec![HistoryEntry::new(
                    crate::workflow::item::HistoryAction::Reassigned,
                    performed_by,
                    Some(changes.join(", ")),
                )],
                ..Default::default()
            };

            let outcome = self
                .retry
                .execute(OP_CONTENT_WRITE, &self.policy, id, || {
                    self.store.patch(id, item.version, patch.clone())
                })
                .await;

            match outcome.result {
                Ok(updated) => {
                    info!(work_item = %id, performed_by, "work item reassigned");
                    self.log_action(
                        "workflow.update_assignments",
                        id,
                        Some(performed_by),
                        AuditStatus::Success,
                        json!({ "assigned_to": updated.assigned_to, "reviewer": updated.reviewer }),
                    )
                    .await;
                    self.dispatch_best_effort(
                        Notification::new(
                            NotificationKind::Reassigned,
                            format!("Reassigned: {}", updated.title),
                            format!("Work item '{}' was reassigned", updated.title),
                            updated.priority,
                            RecipientRole::Authors,
                        )
                        .for_work_item(id),
                    )
                    .await;
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. })
                    if conflict_rounds < self.max_conflict_rounds =>
                {
                    conflict_rounds += 1;
                }
                Err(error) => {
                    self.record_operation_failure("workflow.update_assignments", id, &error)
                        .await;
                    return Err(self.map_store_error(error, outcome.attempts));
                }
            }
        }
    }

    /// Appends a comment. Comments are activity, not status: no
    /// status-bearing history entry is written.
    pub async fn add_comment(
        &self,
        id: &str,
        author: &str,
        text: &str,
        kind: CommentKind,
    ) -> Result<WorkItem, WorkflowError> {
        if text.trim().is_empty() {
            return Err(WorkflowError::Validation("comment text must not be empty".to_string()));
        }

        let mut conflict_rounds = 0;

        loop {
            let item = self.read_item(id).await?;

            let patch = WorkItemPatch {
                append_comments: vec![Comment::new(author, text, kind)],
                ..Default::default()
            };

            let outcome = self
                .retry
                .execute(OP_CONTENT_WRITE, &self.policy, id, || {
                    self.store.patch(id, item.version, patch.clone())
                })
                .await;

            match outcome.result {
                Ok(updated) => {
                    self.log_action(
                        "workflow.add_comment",
                        id,
                        Some(author),
                        AuditStatus::Success,
                        json!({ "kind": kind }),
                    )
                    .await;
                    if updated.notification_prefs.notify_on_comment {
                        self.dispatch_best_effort(
                            Notification::new(
                                NotificationKind::CommentAdded,
                                format!("New comment on {}", updated.title),
                                format!("{author} commented on '{}'", updated.title),
                                updated.priority,
                                RecipientRole::Authors,
                            )
                            .for_work_item(id),
                        )
                        .await;
                    }
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. })
                    if conflict_rounds < self.max_conflict_rounds =>
                {
                    conflict_rounds += 1;
                }
                Err(error) => {
                    self.record_operation_failure("workflow.add_comment", id, &error)
                        .await;
                    return Err(self.map_store_error(error, outcome.attempts));
                }
            }
        }
    }

    /// Applies a bulk action to each id independently. Per-id failures are
    /// collected, not raised; under `AllOrNothing` the whole batch is
    /// validated first and nothing is written if any item would fail
    /// validation. A cancelled token stops processing; remaining ids are
    /// reported as errors.
    pub async fn bulk_action(
        &self,
        action: BulkAction,
        ids: &[String],
        editor: &EditorInfo,
        cancel: &CancellationToken,
    ) -> BulkOutcome {
        let workflow_action = action.workflow_action();

        if self.bulk_policy == BulkPolicy::AllOrNothing {
            let mut validation_errors = Vec::new();
            for id in ids {
                match self.read_item(id).await {
                    Ok(item) => {
                        if workflow_action.next_status(item.status).is_none() {
                            validation_errors.push(BulkError {
                                id: id.clone(),
                                message: format!(
                                    "invalid transition: {workflow_action} not allowed from {}",
                                    item.status
                                ),
                            });
                        }
                    }
                    Err(error) => validation_errors.push(BulkError {
                        id: id.clone(),
                        message: error.to_string(),
                    }),
                }
            }
            if !validation_errors.is_empty() {
                warn!(
                    action = ?action,
                    failed = validation_errors.len(),
                    "all-or-nothing bulk action rejected during validation"
                );
                return BulkOutcome {
                    processed: 0,
                    errors: validation_errors,
                };
            }
        }

        let mut processed = 0;
        let mut errors = Vec::new();

        for id in ids {
            if cancel.is_cancelled() {
                errors.push(BulkError {
                    id: id.clone(),
                    message: "cancelled before processing".to_string(),
                });
                continue;
            }

            match self
                .change_status(id, workflow_action, &editor.editor_id, editor.notes.clone())
                .await
            {
                Ok(_) => processed += 1,
                Err(error) => errors.push(BulkError {
                    id: id.clone(),
                    message: error.to_string(),
                }),
            }
        }

        info!(
            action = ?action,
            processed,
            failed = errors.len(),
            "bulk action completed"
        );
        BulkOutcome { processed, errors }
    }

    async fn read_item(&self, id: &str) -> Result<WorkItem, WorkflowError> {
        let outcome = self
            .retry
            .execute(OP_CONTENT_READ, &self.policy, id, || self.store.get(id))
            .await;

        match outcome.result {
            Ok(item) => Ok(item),
            Err(error) => {
                if error.is_transient() || matches!(error, StoreError::CircuitOpen { .. }) {
                    self.record_operation_failure("workflow.read", id, &error).await;
                }
                Err(self.map_store_error(error, outcome.attempts))
            }
        }
    }

    fn map_store_error(&self, error: StoreError, attempts: u32) -> WorkflowError {
        match error {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::Validation(message) => WorkflowError::Validation(message),
            other => WorkflowError::OperationFailed {
                attempts,
                source: other,
            },
        }
    }

    /// Best-effort audit logging. Off the critical path: failures are
    /// logged and dropped.
    async fn log_action(
        &self,
        kind: &str,
        work_item_id: &str,
        user: Option<&str>,
        status: AuditStatus,
        mut metadata: serde_json::Value,
    ) {
        if let Some(map) = metadata.as_object_mut() {
            map.insert("work_item_id".to_string(), json!(work_item_id));
        }
        let mut entry = AuditEntry::new(kind, status, metadata);
        if let Some(user) = user {
            entry = entry.with_user(user);
        }
        if let Err(error) = self.audit.record(entry).await {
            warn!(kind, work_item = %work_item_id, error = %error, "audit logging failed");
        }
    }

    async fn record_operation_failure(&self, operation: &str, work_item_id: &str, error: &StoreError) {
        let record = ErrorRecord::new(operation, error.to_string()).for_work_item(work_item_id);
        if let Err(store_error) = self.error_store.record(record).await {
            warn!(operation, error = %store_error, "error store write failed");
        }
    }

    async fn notify_status_change(&self, item: &WorkItem, action: WorkflowAction) {
        if !item.notification_prefs.notify_on_status_change {
            return;
        }

        let (kind, role) = match item.status {
            WorkItemStatus::PendingReview => {
                (NotificationKind::ReviewRequested, RecipientRole::Editors)
            }
            _ => (NotificationKind::StatusChanged, RecipientRole::Authors),
        };

        let notification = Notification::new(
            kind,
            format!("{}: {}", item.status, item.title),
            format!("Work item '{}' moved to {} via {}", item.title, item.status, action),
            item.priority,
            role,
        )
        .for_work_item(&item.id);

        self.dispatch_best_effort(notification).await;
    }

    async fn dispatch_best_effort(&self, notification: Notification) {
        if let Err(error) = self.notifier.send(notification).await {
            warn!(error = %error, "notification dispatch failed");
        }
    }
}
