//! Editorial workflow: the work item model, the fixed transition table, and
//! the engine that drives items through review.

pub mod engine;
pub mod item;

pub use engine::{
    BulkError, BulkOutcome, BulkPolicy, ChangeStatusOptions, EditorInfo, WorkflowEngine,
    WorkflowError,
};
pub use item::{
    BulkAction, Comment, CommentKind, HistoryAction, HistoryEntry, NotificationPrefs, Priority,
    WorkItem, WorkItemFilter, WorkItemPatch, WorkItemStatus, WorkflowAction,
};
