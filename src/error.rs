/// Error taxonomy for the approval engine.
///
/// Every failure the kit reports is a [`FlowError`]. Callers that only care
/// about the class of a failure use [`FlowError::kind`], whose string form is
/// the stable sentinel name (`"invalid_template"`, `"approval_pending"`, ...).

use crate::task::TaskState;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors raised by template validation, task operations and node execution
#[derive(Debug, Error)]
pub enum FlowError {
    /// Template validation failure or malformed node config
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// `(id, version)` already present in the template store
    #[error("template '{id}' version {version} already exists")]
    DuplicateTemplate { id: String, version: u32 },

    #[error("template '{id}' not found")]
    TemplateNotFound { id: String },

    #[error("task '{0}' not found")]
    TaskNotFound(String),

    /// Attempted transition is not in the legal matrix
    #[error("invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: TaskState,
        to: TaskState,
        reason: String,
    },

    #[error("node '{0}' not found in template")]
    NodeNotFound(String),

    /// The operation targets a node that is not the task's current node
    #[error("node '{node_id}' is not active (current node: '{current}')")]
    NodeNotActive { node_id: String, current: String },

    #[error("user '{user}' is not an approver of node '{node_id}'")]
    ApproverNotFound { node_id: String, user: String },

    #[error("user '{user}' already decided on node '{node_id}'")]
    AlreadyDecided { node_id: String, user: String },

    /// Control-flow signal: the approval node still awaits decisions
    #[error("approval pending on node '{node_id}'")]
    ApprovalPending { node_id: String },

    /// Reserved for optimistic-concurrency store implementations
    #[error("concurrent modification of task '{0}'")]
    ConcurrentModification(String),

    /// Reserved for notification collaborators
    #[error("event push failed: {0}")]
    EventPushFailed(String),

    #[error("operation '{permission}' is not permitted on node '{node_id}'")]
    PermissionDenied {
        node_id: String,
        permission: &'static str,
    },

    #[error("node '{0}' requires a comment")]
    CommentRequired(String),

    #[error("node '{0}' requires attachments")]
    AttachmentsRequired(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("condition evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Dynamic approver lookup failed; `source` is the last underlying cause
    #[error("approver resolution via {url} failed after {attempts} attempt(s)")]
    ApproverResolution {
        url: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

/// Data-level failures while evaluating a condition tree
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("unsupported value source '{0}'")]
    UnsupportedSource(String),

    #[error("node_id is required when source is node_outputs")]
    MissingNodeId,

    #[error("no output recorded for node '{0}'")]
    MissingNodeOutput(String),

    #[error("malformed JSON input: {0}")]
    MalformedJson(String),

    #[error("field '{0}' not found")]
    MissingField(String),

    #[error("field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("composite condition has no child conditions")]
    EmptyComposite,
}

/// Stable classification of [`FlowError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTemplate,
    Duplicate,
    TemplateNotFound,
    TaskNotFound,
    InvalidStateTransition,
    NodeNotFound,
    NodeNotActive,
    ApproverNotFound,
    AlreadyDecided,
    ApprovalPending,
    ConcurrentModification,
    EventPushFailed,
    PermissionDenied,
    CommentRequired,
    AttachmentsRequired,
    InvalidOperation,
    Evaluation,
    ApproverResolution,
}

impl ErrorKind {
    /// Sentinel name of this error class
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTemplate => "invalid_template",
            Self::Duplicate => "duplicate",
            Self::TemplateNotFound => "template_not_found",
            Self::TaskNotFound => "task_not_found",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::NodeNotFound => "node_not_found",
            Self::NodeNotActive => "node_not_active",
            Self::ApproverNotFound => "approver_not_found",
            Self::AlreadyDecided => "already_decided",
            Self::ApprovalPending => "approval_pending",
            Self::ConcurrentModification => "concurrent_modification",
            Self::EventPushFailed => "event_push_failed",
            Self::PermissionDenied => "permission_denied",
            Self::CommentRequired => "comment_required",
            Self::AttachmentsRequired => "attachments_required",
            Self::InvalidOperation => "invalid_operation",
            Self::Evaluation => "evaluation_error",
            Self::ApproverResolution => "approver_resolution_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTemplate(_) => ErrorKind::InvalidTemplate,
            Self::DuplicateTemplate { .. } => ErrorKind::Duplicate,
            Self::TemplateNotFound { .. } => ErrorKind::TemplateNotFound,
            Self::TaskNotFound(_) => ErrorKind::TaskNotFound,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Self::NodeNotFound(_) => ErrorKind::NodeNotFound,
            Self::NodeNotActive { .. } => ErrorKind::NodeNotActive,
            Self::ApproverNotFound { .. } => ErrorKind::ApproverNotFound,
            Self::AlreadyDecided { .. } => ErrorKind::AlreadyDecided,
            Self::ApprovalPending { .. } => ErrorKind::ApprovalPending,
            Self::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            Self::EventPushFailed(_) => ErrorKind::EventPushFailed,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::CommentRequired(_) => ErrorKind::CommentRequired,
            Self::AttachmentsRequired(_) => ErrorKind::AttachmentsRequired,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::Evaluation(_) => ErrorKind::Evaluation,
            Self::ApproverResolution { .. } => ErrorKind::ApproverResolution,
        }
    }

    /// Shorthand used by the template validators
    pub(crate) fn invalid_template(message: impl Into<String>) -> Self {
        Self::InvalidTemplate(message.into())
    }
}
