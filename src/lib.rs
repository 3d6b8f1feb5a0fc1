// Copydesk Library - Content Workflow Automation and Resilience
// This exposes the core components for testing and integration

pub mod cleanup;
pub mod config;
pub mod drafts;
pub mod resilience;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use cleanup::{
    CleanupConfig, CleanupConfigPatch, CleanupError, CleanupEstimate, CleanupRun, CleanupStatus,
    RetentionScheduler,
};
pub use config::{config, init_config, CopydeskConfig};
pub use drafts::DraftMetadata;
pub use resilience::{
    BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, RetryExecutor, RetryOutcome,
    RetryPolicy,
};
pub use service::{AdminService, ApiResponse, CreatedWorkItem, ErrorCode};
pub use store::{
    AuditEntry, AuditLog, AuditStatus, ContentStore, ErrorRecord, ErrorStore, Notification,
    NotificationDispatcher, NotificationKind, RecipientRole, StoreError,
};
pub use telemetry::{
    create_workflow_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
pub use workflow::{
    BulkAction, BulkError, BulkOutcome, BulkPolicy, ChangeStatusOptions, Comment, CommentKind,
    EditorInfo, HistoryAction, HistoryEntry, Priority, WorkItem, WorkItemFilter, WorkItemPatch,
    WorkItemStatus, WorkflowAction, WorkflowEngine, WorkflowError,
};
