/// Runtime Execution Engine
///
/// This module drives tasks through their template graph.
/// It handles:
/// - Node execution contexts and the per-task context cache
/// - Per-node-type executors
/// - The graph walker that advances through automatic nodes

// Execution context, cache, node results and events
pub mod context;

// Graph walker over start / condition / approval / end nodes
pub mod engine;

// Individual node execution handlers
pub mod executor;

// Re-export main types
pub use context::{
    json_type_name, lookup_path, ContextCache, EventType, NodeContext, NodeEvent, NodeResult,
    ValueSource,
};
pub use engine::{WalkOutcome, WorkflowEngine};
pub use executor::{
    ApprovalExecutor, ConditionExecutor, EndExecutor, NodeExecutor, NodeExecutors, StartExecutor,
};
