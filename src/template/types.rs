/// Core template type definitions
///
/// Defines approval templates as versioned directed graphs of nodes and edges.
/// These types are serialized/deserialized from JSON so any storage backend can persist them.

use super::node_config::{ApprovalNodeConfig, ConditionNodeConfig, NodeConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A versioned approval process definition
///
/// Identity is `(id, version)`. Stored templates are never mutated; an update
/// appends a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Template identifier (e.g., "tpl-expense")
    pub id: String,
    /// Human-readable template name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Version number, starting at 1
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Nodes keyed by node ID
    pub nodes: HashMap<String, Node>,
    /// Directed edges in declaration order
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Optional webhook / auth settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TemplateConfig>,
}

impl Template {
    /// Create an empty version-1 template
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            nodes: HashMap::new(),
            edges: Vec::new(),
            config: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a node, replacing any node with the same ID
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    pub fn with_config(mut self, config: TemplateConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// The unique start node, if present
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes
            .values()
            .find(|node| node.node_type == NodeType::Start)
    }

    /// Edges leaving `node_id`, in declaration order
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| edge.from == node_id).collect()
    }

    /// Target of the first edge leaving `node_id`
    pub fn next_node_id(&self, node_id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|edge| edge.from == node_id)
            .map(|edge| edge.to.as_str())
    }

    /// Approval nodes with their configs
    pub fn approval_nodes(&self) -> impl Iterator<Item = (&Node, &ApprovalNodeConfig)> {
        self.nodes
            .values()
            .filter_map(|node| node.approval_config().map(|config| (node, config)))
    }
}

/// A vertex of the template graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the template
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Advisory ordering hint; never drives execution
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeConfig>,
}

impl Node {
    fn bare(id: impl Into<String>, node_type: NodeType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type,
            order: 0,
            config: None,
        }
    }

    pub fn start(id: impl Into<String>) -> Self {
        Self::bare(id, NodeType::Start)
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::bare(id, NodeType::End)
    }

    pub fn approval(id: impl Into<String>, config: ApprovalNodeConfig) -> Self {
        let mut node = Self::bare(id, NodeType::Approval);
        node.config = Some(NodeConfig::Approval(config));
        node
    }

    pub fn condition(id: impl Into<String>, config: ConditionNodeConfig) -> Self {
        let mut node = Self::bare(id, NodeType::Condition);
        node.config = Some(NodeConfig::Condition(config));
        node
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn approval_config(&self) -> Option<&ApprovalNodeConfig> {
        match &self.config {
            Some(NodeConfig::Approval(config)) => Some(config),
            _ => None,
        }
    }

    pub fn condition_config(&self) -> Option<&ConditionNodeConfig> {
        match &self.config {
            Some(NodeConfig::Condition(config)) => Some(config),
            _ => None,
        }
    }
}

/// Available node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Entry point; completes immediately
    Start,
    /// Blocks until its approval mode reports completion
    Approval,
    /// Routes to `true_node_id` / `false_node_id`; evaluated immediately
    Condition,
    /// Terminates the walk
    End,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Approval => "approval",
            Self::Condition => "condition",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Advisory label only; branching is driven by condition node configs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.condition = Some(label.into());
        self
    }
}

/// Template-level integration settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

/// Webhook subscription (delivery is performed by an external collaborator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Event names to deliver; empty means all
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[default]
    None,
    Bearer,
    Basic,
    ApiKey,
}

/// Credentials attached to outbound template integrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub kind: AuthKind,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}
