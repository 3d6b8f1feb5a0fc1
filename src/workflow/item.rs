use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Review status of a content work item.
///
/// `Published` and `Rejected` are terminal: no action leads out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    NeedsRevision,
    Published,
}

impl WorkItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkItemStatus::Published | WorkItemStatus::Rejected)
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkItemStatus::Draft => "draft",
            WorkItemStatus::PendingReview => "pending_review",
            WorkItemStatus::Approved => "approved",
            WorkItemStatus::Rejected => "rejected",
            WorkItemStatus::NeedsRevision => "needs_revision",
            WorkItemStatus::Published => "published",
        };
        write!(f, "{}", label)
    }
}

/// Actions an editor can perform against a work item's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Approve,
    Reject,
    RequestRevision,
    Resubmit,
    Publish,
    PublishScheduled,
}

impl WorkflowAction {
    /// The fixed transition table. Returns `None` when the action is not
    /// allowed from the given status.
    pub fn next_status(self, from: WorkItemStatus) -> Option<WorkItemStatus> {
        use WorkItemStatus::*;
        match (from, self) {
            (Draft, WorkflowAction::Submit) => Some(PendingReview),
            (PendingReview, WorkflowAction::Approve) => Some(Approved),
            (PendingReview, WorkflowAction::Reject) => Some(Rejected),
            (PendingReview, WorkflowAction::RequestRevision) => Some(NeedsRevision),
            (NeedsRevision, WorkflowAction::Resubmit) => Some(PendingReview),
            (Approved, WorkflowAction::Publish) => Some(Published),
            (Approved, WorkflowAction::PublishScheduled) => Some(Published),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowAction::Submit => "submit",
            WorkflowAction::Approve => "approve",
            WorkflowAction::Reject => "reject",
            WorkflowAction::RequestRevision => "request_revision",
            WorkflowAction::Resubmit => "resubmit",
            WorkflowAction::Publish => "publish",
            WorkflowAction::PublishScheduled => "publish_scheduled",
        };
        write!(f, "{}", label)
    }
}

/// Batch operations exposed to the admin UI. Each maps onto a single-item
/// workflow action applied per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    ApproveAll,
    RejectAll,
    MarkForReview,
}

impl BulkAction {
    pub fn workflow_action(self) -> WorkflowAction {
        match self {
            BulkAction::ApproveAll => WorkflowAction::Approve,
            BulkAction::RejectAll => WorkflowAction::Reject,
            BulkAction::MarkForReview => WorkflowAction::Submit,
        }
    }
}

/// Priority levels for work items in the review queue.
/// Higher values = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        write!(f, "{}", label)
    }
}

/// What a history entry records. Transitions carry the action that produced
/// the current status; `Reassigned` and `Created` are bookkeeping entries
/// that never imply a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Submit,
    Approve,
    Reject,
    RequestRevision,
    Resubmit,
    Publish,
    PublishScheduled,
    Reassigned,
}

impl From<WorkflowAction> for HistoryAction {
    fn from(action: WorkflowAction) -> Self {
        match action {
            WorkflowAction::Submit => HistoryAction::Submit,
            WorkflowAction::Approve => HistoryAction::Approve,
            WorkflowAction::Reject => HistoryAction::Reject,
            WorkflowAction::RequestRevision => HistoryAction::RequestRevision,
            WorkflowAction::Resubmit => HistoryAction::Resubmit,
            WorkflowAction::Publish => HistoryAction::Publish,
            WorkflowAction::PublishScheduled => HistoryAction::PublishScheduled,
        }
    }
}

/// Append-only audit entry on a work item. Entries are never rewritten;
/// timestamps are non-decreasing in history order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub performed_by: String,
    pub notes: Option<String>,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction, performed_by: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            performed_by: performed_by.into(),
            notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    General,
    Suggestion,
    Question,
    Blocking,
}

impl Default for CommentKind {
    fn default() -> Self {
        CommentKind::General
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub resolved: bool,
}

impl Comment {
    pub fn new(author: impl Into<String>, text: impl Into<String>, kind: CommentKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            author: author.into(),
            text: text.into(),
            kind,
            resolved: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFrequency {
    Never,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub notify_on_status_change: bool,
    pub notify_on_comment: bool,
    pub reminder_frequency: ReminderFrequency,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            notify_on_status_change: true,
            notify_on_comment: true,
            reminder_frequency: ReminderFrequency::Daily,
        }
    }
}

/// A unit of content under editorial review.
///
/// Owned by the workflow engine; the content store merely persists it. The
/// `version` field is an optimistic concurrency token: `patch` requires the
/// version observed at read time and rejects stale writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub content_ref: String,
    pub status: WorkItemStatus,
    pub assigned_to: Option<String>,
    pub reviewer: Option<String>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub history: Vec<HistoryEntry>,
    pub comments: Vec<Comment>,
    pub notification_prefs: NotificationPrefs,
    pub version: u64,
}

impl WorkItem {
    pub fn new(
        title: impl Into<String>,
        content_ref: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content_ref: content_ref.into(),
            status: WorkItemStatus::Draft,
            assigned_to: None,
            reviewer: None,
            priority: Priority::default(),
            due_date: None,
            history: vec![HistoryEntry::new(HistoryAction::Created, created_by, None)],
            comments: Vec::new(),
            notification_prefs: NotificationPrefs::default(),
            version: 0,
        }
    }
}

/// Partial update applied by `ContentStore::patch`. Fields left as `None`
/// are untouched; `append_history`/`append_comments` are strictly appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_comments: Vec<Comment>,
}

/// Query filter for listing work items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItemFilter {
    pub status: Option<WorkItemStatus>,
    pub assigned_to: Option<String>,
    pub priority: Option<Priority>,
}

impl WorkItemFilter {
    pub fn matches(&self, item: &WorkItem) -> bool {
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(assignee) = &self.assigned_to {
            if item.assigned_to.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if item.priority != priority {
                return false;
            }
        }
        true
    }
}
