//! Admin-facing API surface.
//!
//! `AdminService` is what the (out of scope) HTTP layer calls into. Every
//! mutating operation resolves to an `ApiResponse` envelope; the error
//! codes here are what the transport maps onto status codes (invalid input
//! -> 400, not found -> 404, temporarily unavailable -> 503, internal ->
//! 500). The core never exposes raw collaborator errors to the UI.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cleanup::{CleanupConfig, CleanupConfigPatch, CleanupError, CleanupEstimate, CleanupRun, CleanupStatus, RetentionScheduler};
use crate::drafts::DraftMetadata;
use crate::store::StoreError;
use crate::workflow::{
    BulkAction, BulkOutcome, ChangeStatusOptions, CommentKind, EditorInfo, WorkItem,
    WorkItemFilter, WorkflowAction, WorkflowEngine, WorkflowError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    InvalidTransition,
    TemporarilyUnavailable,
    Internal,
}

/// Success/failure envelope returned by every operation.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
        }
    }

    pub fn err(code: ErrorCode, details: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(code),
            details: Some(details.into()),
        }
    }
}

fn map_workflow_error(error: WorkflowError) -> (ErrorCode, String) {
    let details = error.to_string();
    let code = match &error {
        WorkflowError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        WorkflowError::NotFound(_) => ErrorCode::NotFound,
        WorkflowError::Validation(_) => ErrorCode::InvalidInput,
        WorkflowError::OperationFailed { source, .. } => match source {
            StoreError::CircuitOpen { .. } => ErrorCode::TemporarilyUnavailable,
            source if source.is_transient() => ErrorCode::TemporarilyUnavailable,
            _ => ErrorCode::Internal,
        },
    };
    (code, details)
}

/// Creation result: the stored work item plus the editorial metadata
/// derived from the draft, which the admin UI persists onto the post.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedWorkItem {
    pub item: WorkItem,
    pub metadata: DraftMetadata,
}

pub struct AdminService {
    engine: Arc<WorkflowEngine>,
    scheduler: RetentionScheduler,
}

impl AdminService {
    pub fn new(engine: Arc<WorkflowEngine>, scheduler: RetentionScheduler) -> Self {
        Self { engine, scheduler }
    }

    pub fn scheduler(&self) -> &RetentionScheduler {
        &self.scheduler
    }

    pub async fn list_work_items(&self, filter: WorkItemFilter) -> ApiResponse<Vec<WorkItem>> {
        match self.engine.list_work_items(&filter).await {
            Ok(items) => ApiResponse::ok(items),
            Err(error) => {
                let (code, details) = map_workflow_error(error);
                ApiResponse::err(code, details)
            }
        }
    }

    /// Creates a draft work item. When no content reference is supplied,
    /// the slug derived from the title is used. The full derived metadata
    /// is returned with the item so the caller can persist it onto the
    /// draft post.
    pub async fn create_work_item(
        &self,
        title: &str,
        content_ref: Option<String>,
        body: &str,
        created_by: &str,
    ) -> ApiResponse<CreatedWorkItem> {
        if title.trim().is_empty() {
            return ApiResponse::err(ErrorCode::InvalidInput, "title must not be empty");
        }

        let metadata = DraftMetadata::derive(title, body);
        let content_ref = content_ref.unwrap_or_else(|| metadata.slug.clone());
        info!(
            slug = %metadata.slug,
            category = %metadata.category,
            reading_time = metadata.reading_time_minutes,
            "draft metadata derived"
        );

        let item = WorkItem::new(title, content_ref, created_by);
        match self.engine.create_work_item(item).await {
            Ok(created) => ApiResponse::ok(CreatedWorkItem {
                item: created,
                metadata,
            }),
            Err(error) => {
                let (code, details) = map_workflow_error(error);
                ApiResponse::err(code, details)
            }
        }
    }

    pub async fn change_status(
        &self,
        id: &str,
        action: WorkflowAction,
        performed_by: &str,
        notes: Option<String>,
        options: ChangeStatusOptions,
    ) -> ApiResponse<WorkItem> {
        match self
            .engine
            .change_status_with(id, action, performed_by, notes, options)
            .await
        {
            Ok(item) => ApiResponse::ok(item),
            Err(error) => {
                let (code, details) = map_workflow_error(error);
                ApiResponse::err(code, details)
            }
        }
    }

    pub async fn update_assignments(
        &self,
        id: &str,
        assigned_to: Option<String>,
        reviewer: Option<String>,
        performed_by: &str,
    ) -> ApiResponse<WorkItem> {
        match self
            .engine
            .update_assignments(id, assigned_to, reviewer, performed_by)
            .await
        {
            Ok(item) => ApiResponse::ok(item),
            Err(error) => {
                let (code, details) = map_workflow_error(error);
                ApiResponse::err(code, details)
            }
        }
    }

    pub async fn add_comment(
        &self,
        id: &str,
        author: &str,
        text: &str,
        kind: Option<CommentKind>,
    ) -> ApiResponse<WorkItem> {
        match self
            .engine
            .add_comment(id, author, text, kind.unwrap_or_default())
            .await
        {
            Ok(item) => ApiResponse::ok(item),
            Err(error) => {
                let (code, details) = map_workflow_error(error);
                ApiResponse::err(code, details)
            }
        }
    }

    /// Per-id failures are part of the outcome, not an error envelope:
    /// partial success is expected and reported.
    pub async fn bulk_action(
        &self,
        action: BulkAction,
        ids: &[String],
        editor: EditorInfo,
        cancel: &CancellationToken,
    ) -> ApiResponse<BulkOutcome> {
        if ids.is_empty() {
            return ApiResponse::err(ErrorCode::InvalidInput, "no work item ids supplied");
        }
        let outcome = self.engine.bulk_action(action, ids, &editor, cancel).await;
        ApiResponse::ok(outcome)
    }

    pub async fn trigger_cleanup(&self) -> ApiResponse<CleanupRun> {
        match self.scheduler.force_cleanup().await {
            Ok(run) => ApiResponse::ok(run),
            Err(CleanupError::AlreadyRunning) => ApiResponse::err(
                ErrorCode::TemporarilyUnavailable,
                "a cleanup run is already in flight",
            ),
        }
    }

    pub async fn estimate_cleanup(&self) -> ApiResponse<CleanupEstimate> {
        ApiResponse::ok(self.scheduler.estimate_cleanup().await)
    }

    pub fn cleanup_status(&self) -> ApiResponse<CleanupStatus> {
        ApiResponse::ok(self.scheduler.status())
    }

    pub async fn update_cleanup_config(&self, patch: CleanupConfigPatch) -> ApiResponse<CleanupConfig> {
        self.scheduler.update_config(patch).await;
        ApiResponse::ok(self.scheduler.config())
    }
}
