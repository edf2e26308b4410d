/// Node execution handlers for the four node types
///
/// This module contains the execution logic for each node type:
/// - Start: entry point, passes the task params through
/// - End: terminates the walk
/// - Condition: evaluates its condition tree and picks a branch
/// - Approval: checks the node's approval mode for completion

use super::context::{EventType, NodeContext, NodeEvent, NodeResult};
use crate::approval::{ApprovalResult, Completion};
use crate::condition::{ConditionEvaluator, EvaluationInput};
use crate::error::{FlowError, Result};
use crate::template::{NodeType, RejectBehavior};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Executes one node type
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn node_type(&self) -> NodeType;

    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeResult>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Start
    }

    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeResult> {
        let output = match ctx.params {
            Value::Null => json!({}),
            Value::Object(map) if map.is_empty() => json!({}),
            params => params.clone(),
        };

        Ok(NodeResult {
            next_node_id: String::new(),
            output,
            events: vec![NodeEvent::new(
                EventType::NodeActivated,
                json!({ "node_id": ctx.node.id }),
            )],
            outcome: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::End
    }

    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeResult> {
        Ok(NodeResult {
            next_node_id: String::new(),
            output: json!({}),
            events: vec![NodeEvent::new(
                EventType::NodeCompleted,
                json!({ "node_id": ctx.node.id }),
            )],
            outcome: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionExecutor {
    evaluator: ConditionEvaluator,
}

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeResult> {
        let config = ctx.node.condition_config().ok_or_else(|| {
            FlowError::invalid_template(format!(
                "condition node '{}' has no condition config",
                ctx.node.id
            ))
        })?;
        config.validate()?;

        let input = EvaluationInput::new(ctx.params, ctx.outputs);
        let result = self.evaluator.evaluate(&config.condition, &input)?;
        let next_node_id = if result {
            config.true_node_id.clone()
        } else {
            config.false_node_id.clone()
        };

        tracing::debug!(
            "🔀 Condition node '{}' evaluated to {} -> '{}'",
            ctx.node.id,
            result,
            next_node_id
        );

        Ok(NodeResult {
            output: json!({ "condition_result": result, "next_node_id": next_node_id }),
            next_node_id,
            events: Vec::new(),
            outcome: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalExecutor;

#[async_trait]
impl NodeExecutor for ApprovalExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Approval
    }

    /// Report completion of the node, or `ApprovalPending` while it still waits
    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeResult> {
        let node_id = &ctx.node.id;
        let config = ctx.node.approval_config().ok_or_else(|| {
            FlowError::invalid_template(format!("approval node '{node_id}' has no approval config"))
        })?;

        let resolved;
        let approvers: &[String] = match ctx.task.approvers.get(node_id) {
            Some(list) if !list.is_empty() => list,
            _ => {
                resolved = config.approver_config.get_approvers(ctx).await?;
                &resolved
            }
        };

        let empty = HashMap::new();
        let approvals = ctx.task.approvals.get(node_id).unwrap_or(&empty);

        let result = match config.mode.handler().check_completion(approvers, approvals, config)? {
            Completion::Pending => {
                return Err(FlowError::ApprovalPending {
                    node_id: node_id.clone(),
                })
            }
            Completion::Complete(result) => result,
        };

        let next_node_id = match (result, config.reject_behavior) {
            (ApprovalResult::Reject, RejectBehavior::Jump) => {
                config.reject_target_node.clone().unwrap_or_default()
            }
            _ => String::new(),
        };

        tracing::info!(
            "✅ Approval node '{}' completed ({} mode): {}",
            node_id,
            config.mode,
            result
        );

        Ok(NodeResult {
            next_node_id,
            output: json!({ "result": result }),
            events: vec![NodeEvent::new(
                EventType::NodeCompleted,
                json!({ "node_id": node_id, "result": result }),
            )],
            outcome: Some(result),
        })
    }
}

/// Executor table keyed by node type
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeExecutors {
    start: StartExecutor,
    end: EndExecutor,
    condition: ConditionExecutor,
    approval: ApprovalExecutor,
}

impl NodeExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(&self, node_type: NodeType) -> &dyn NodeExecutor {
        match node_type {
            NodeType::Start => &self.start,
            NodeType::End => &self.end,
            NodeType::Condition => &self.condition,
            NodeType::Approval => &self.approval,
        }
    }

    /// Execute the node in `ctx` with the matching executor
    pub async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeResult> {
        let node = ctx.node;
        tracing::debug!("🚀 Executing node '{}' (type: {})", node.id, node.node_type);
        let start_time = std::time::Instant::now();

        let result = self.for_type(node.node_type).execute(ctx).await;

        match &result {
            Ok(_) => tracing::debug!("✅ Node '{}' executed in {:?}", node.id, start_time.elapsed()),
            Err(FlowError::ApprovalPending { .. }) => {
                tracing::debug!("⏸️ Node '{}' is waiting for more decisions", node.id)
            }
            Err(e) => tracing::error!("❌ Node '{}' failed: {}", node.id, e),
        }
        result
    }
}
