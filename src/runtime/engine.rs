/// Graph walker for approval templates
///
/// Activates nodes and runs their executors until the task parks on an
/// approval node that still needs decisions, or the walk reaches an end.
/// Start and condition nodes complete immediately; approval is the only
/// blocking node type.

use super::context::{ContextCache, NodeContext, NodeResult};
use super::executor::NodeExecutors;
use crate::approval::ApprovalResult;
use crate::approver::{ApproverTiming, HttpClient};
use crate::config::{EngineConfig, RetryPolicy};
use crate::error::{FlowError, Result};
use crate::task::TaskData;
use crate::template::{ApprovalNodeConfig, Node, NodeType, RejectBehavior, Template};
use chrono::Utc;
use std::sync::Arc;

/// Where a walk stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The resumed node still awaits decisions; nothing moved
    Pending,
    /// Parked on a freshly activated approval node
    Blocked { node_id: String },
    /// Reached an end node (or a node with no way forward)
    Finished { decision: Option<ApprovalResult> },
    /// An approval node rejected with `terminate`
    Terminated { node_id: String },
}

/// What happened to one node
enum Step {
    Blocked,
    Next(String),
    Finished,
    Terminated,
}

/// Graph walker shared by every task operation
pub struct WorkflowEngine {
    executors: NodeExecutors,
    config: EngineConfig,
    retry: RetryPolicy,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("has_http_client", &self.http_client.is_some())
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(config: EngineConfig, retry: RetryPolicy) -> Self {
        Self {
            executors: NodeExecutors::new(),
            config,
            retry,
            http_client: None,
        }
    }

    pub fn with_http_client(mut self, client: Option<Arc<dyn HttpClient>>) -> Self {
        self.http_client = client;
        self
    }

    fn context<'a>(
        &self,
        task: &'a TaskData,
        node: &'a Node,
        template: &'a Template,
        cache: &'a ContextCache,
    ) -> NodeContext<'a> {
        NodeContext::new(task, node, template)
            .with_cache(cache)
            .with_http_client(self.http_client.clone())
            .with_retry(self.retry)
    }

    /// Resolve approvers for every `on_create` approval node
    ///
    /// Failures are logged and the node is left for resolution at activation.
    pub async fn resolve_on_create(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
    ) {
        let mut nodes: Vec<(&Node, _)> = template.approval_nodes().collect();
        nodes.sort_by(|a, b| a.0.id.cmp(&b.0.id));

        for (node, config) in nodes {
            if config.approver_config.timing() != ApproverTiming::OnCreate {
                continue;
            }

            let resolved = {
                let ctx = self.context(task, node, template, cache);
                config.approver_config.get_approvers(&ctx).await
            }
            .and_then(|approvers| check_resolved(node, config, approvers));
            match resolved {
                Ok(approvers) => {
                    tracing::debug!(
                        "👥 Pre-resolved {} approver(s) for node '{}'",
                        approvers.len(),
                        node.id
                    );
                    task.approvers.insert(node.id.clone(), approvers);
                }
                Err(e) => tracing::warn!(
                    "⚠️ On-create approver resolution for node '{}' of task '{}' failed, deferring to activation: {}",
                    node.id,
                    task.id,
                    e
                ),
            }
        }
    }

    /// Walk from the template's start node
    pub async fn start(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
    ) -> Result<WalkOutcome> {
        let start = template
            .start_node()
            .ok_or_else(|| FlowError::invalid_template("template has no start node"))?;
        tracing::info!("🚀 Starting walk of task '{}' at '{}'", task.id, start.id);
        self.walk(task, template, cache, start.id.clone(), true).await
    }

    /// Re-run the current node and continue if it is now complete
    pub async fn resume(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
    ) -> Result<WalkOutcome> {
        let current = task.current_node.clone();
        self.walk(task, template, cache, current, false).await
    }

    async fn walk(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
        mut node_id: String,
        mut activate: bool,
    ) -> Result<WalkOutcome> {
        let mut activated_any = false;

        for _ in 0..self.config.max_walk_steps {
            let node = template
                .node(&node_id)
                .ok_or_else(|| FlowError::NodeNotFound(node_id.clone()))?;

            if activate {
                self.activate(task, template, cache, node).await?;
                activated_any = true;
            }

            match self.step(task, template, cache, node).await? {
                Step::Blocked if activated_any => {
                    tracing::info!("⏸️ Task '{}' waiting on approval node '{}'", task.id, node.id);
                    return Ok(WalkOutcome::Blocked { node_id });
                }
                Step::Blocked => return Ok(WalkOutcome::Pending),
                Step::Finished => {
                    tracing::info!("🎉 Task '{}' reached the end of its template", task.id);
                    return Ok(WalkOutcome::Finished {
                        decision: task.last_decision,
                    });
                }
                Step::Terminated => return Ok(WalkOutcome::Terminated { node_id }),
                Step::Next(next) => {
                    node_id = next;
                    activate = true;
                }
            }
        }

        tracing::error!(
            "❌ Walk of task '{}' exceeded {} steps",
            task.id,
            self.config.max_walk_steps
        );
        Err(FlowError::invalid_template(format!(
            "walk exceeded {} steps without blocking or ending",
            self.config.max_walk_steps
        )))
    }

    /// Make `node` current; approval nodes get fresh approvals and resolved approvers
    async fn activate(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
        node: &Node,
    ) -> Result<()> {
        tracing::debug!("📍 Activating node '{}' (type: {}) of task '{}'", node.id, node.node_type, task.id);

        task.current_node = node.id.clone();
        task.node_activated_at.insert(node.id.clone(), Utc::now());
        task.node_path.push(node.id.clone());

        if node.node_type != NodeType::Approval {
            return Ok(());
        }

        task.approvals.remove(&node.id);
        self.ensure_approvers(task, template, cache, node).await
    }

    /// Resolve the approvers of `node` unless the task already holds a list
    pub async fn ensure_approvers(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
        node: &Node,
    ) -> Result<()> {
        if !task.approvers_of(&node.id).is_empty() {
            return Ok(());
        }
        let config = node.approval_config().ok_or_else(|| {
            FlowError::invalid_template(format!("approval node '{}' has no approval config", node.id))
        })?;

        let approvers = {
            let ctx = self.context(task, node, template, cache);
            config.approver_config.get_approvers(&ctx).await?
        };
        let approvers = check_resolved(node, config, approvers)?;
        tracing::debug!("👥 Resolved {} approver(s) for node '{}'", approvers.len(), node.id);
        task.approvers.insert(node.id.clone(), approvers);
        Ok(())
    }

    /// Execute `node` and work out where to go next
    async fn step(
        &self,
        task: &mut TaskData,
        template: &Template,
        cache: &ContextCache,
        node: &Node,
    ) -> Result<Step> {
        let executed = {
            let ctx = self.context(task, node, template, cache);
            self.executors.execute(&ctx).await
        };

        let NodeResult {
            next_node_id,
            output,
            events,
            outcome,
        } = match executed {
            Ok(result) => result,
            Err(FlowError::ApprovalPending { .. }) => return Ok(Step::Blocked),
            Err(e) => return Err(e),
        };

        task.events.extend(events);
        task.node_outputs.insert(node.id.clone(), output);

        let next = match node.node_type {
            NodeType::End => return Ok(Step::Finished),
            NodeType::Condition => Some(next_node_id),
            NodeType::Start => template.next_node_id(&node.id).map(str::to_string),
            NodeType::Approval => {
                task.last_decision = outcome;
                match outcome {
                    Some(ApprovalResult::Reject) => {
                        return self.on_reject(task, template, node, next_node_id)
                    }
                    _ => template.next_node_id(&node.id).map(str::to_string),
                }
            }
        };

        Ok(next
            .filter(|id| !id.is_empty())
            .map_or(Step::Finished, Step::Next))
    }

    fn on_reject(
        &self,
        task: &TaskData,
        template: &Template,
        node: &Node,
        jump_target: String,
    ) -> Result<Step> {
        let behavior = node
            .approval_config()
            .map(|config| config.reject_behavior)
            .unwrap_or_default();

        match behavior {
            RejectBehavior::Terminate => {
                tracing::info!("🛑 Node '{}' rejected task '{}'", node.id, task.id);
                Ok(Step::Terminated)
            }
            RejectBehavior::Jump => {
                if jump_target.is_empty() {
                    return Err(FlowError::invalid_template(format!(
                        "node '{}' rejects with jump but has no reject_target_node",
                        node.id
                    )));
                }
                tracing::info!("↪️ Node '{}' rejected, jumping to '{}'", node.id, jump_target);
                Ok(Step::Next(jump_target))
            }
            RejectBehavior::Rollback => {
                let target = preceding_approval_node(task, template, &node.id)
                    .unwrap_or_else(|| node.id.clone());
                tracing::info!("⏪ Node '{}' rejected, rolling back to '{}'", node.id, target);
                Ok(Step::Next(target))
            }
        }
    }
}

/// Reject resolved lists the node's mode can never complete with
fn check_resolved(
    node: &Node,
    config: &ApprovalNodeConfig,
    approvers: Vec<String>,
) -> Result<Vec<String>> {
    if approvers.is_empty() {
        return Err(FlowError::InvalidOperation(format!(
            "no approvers resolved for node '{}'",
            node.id
        )));
    }
    if approvers.len() < config.min_approvers() {
        return Err(FlowError::InvalidOperation(format!(
            "node '{}' resolved {} approver(s) but {} mode needs at least {}",
            node.id,
            approvers.len(),
            config.mode,
            config.min_approvers()
        )));
    }
    Ok(approvers)
}

/// Last approval node activated before `node_id` was first reached
fn preceding_approval_node(task: &TaskData, template: &Template, node_id: &str) -> Option<String> {
    let first_visit = task.node_path.iter().position(|id| id == node_id)?;
    task.node_path[..first_visit]
        .iter()
        .rev()
        .find(|id| {
            template
                .node(id)
                .is_some_and(|node| node.node_type == NodeType::Approval)
        })
        .cloned()
}
