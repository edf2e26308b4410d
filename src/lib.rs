/// Approvalflow: approval workflow engine kit
///
/// This library provides versioned approval templates validated as petgraph DAGs,
/// a task lifecycle state machine with per-task locking, pluggable node execution
/// and five multi-approver completion modes.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Tracing subscriber bootstrap
pub mod telemetry;

// Template management layer - definitions, validation and the versioned store
pub mod template;

// Approver configuration - fixed lists and HTTP-resolved lists with retry
pub mod approver;

// Condition trees used by condition nodes
pub mod condition;

// Approval-mode completion strategies
pub mod approval;

// Task management layer - lifecycle, locking, storage and the task manager
pub mod task;

// Runtime execution engine - node executors and the graph walker
pub mod runtime;

// Re-export commonly used types for external consumers
pub use approval::{ApprovalMode, ApprovalResult};
pub use approver::{ApproverConfig, ApproverTiming, DynamicApproverConfig, HttpApiConfig, HttpClient};
pub use condition::{Condition, ConditionEvaluator};
pub use config::{Config, RetryPolicy};
pub use error::{ErrorKind, EvaluationError, FlowError, Result};
pub use task::{ApprovalRecord, DecisionInput, Task, TaskData, TaskManager, TaskState};
pub use template::{
    ApprovalNodeConfig, ConditionNodeConfig, Edge, MemoryTemplateStore, Node, NodeType, Template,
    TemplateStore,
};
