/// Template Management Layer
///
/// Approval templates are versioned directed graphs. This module provides:
/// - Type definitions (Template, Node, Edge, node configs)
/// - Ingest validation backed by a petgraph view of the graph
/// - The versioned template store

// Core template type definitions
pub mod types;

// Approval / condition node configuration
pub mod node_config;

// Structural validation applied before a template is stored
mod validate;

// Petgraph analysis (cycles, reachability, fan-out)
pub mod graph;

// Versioned store with snapshot reads
pub mod store;

pub use graph::TemplateGraph;
pub use node_config::{
    ApprovalNodeConfig, ApprovalPermissions, ConditionNodeConfig, NodeConfig,
    ProportionalThreshold, RejectBehavior,
};
pub use store::{MemoryTemplateStore, TemplateStore};
pub use types::{AuthConfig, AuthKind, Edge, Node, NodeType, Template, TemplateConfig, WebhookConfig};
