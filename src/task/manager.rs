/// Task manager
///
/// Public entry point for task lifecycle operations. Every operation takes
/// the task's exclusive lock for its full duration, works on a draft copy of
/// the task data, and commits the draft only if the whole operation succeeds.

use super::handle::Task;
use super::state::{transition, TaskState};
use super::store::{MemoryTaskStore, TaskStore};
use super::types::{Approval, ApprovalRecord, DecisionInput, RecordAction, TaskData};
use crate::approval::{ApprovalMode, ApprovalResult};
use crate::approver::{HttpClient, ReqwestHttpClient};
use crate::config::{Config, RetryPolicy};
use crate::error::{FlowError, Result};
use crate::runtime::{WalkOutcome, WorkflowEngine};
use crate::template::{ApprovalNodeConfig, Node, Template, TemplateStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLockWriteGuard;

/// Operator action gated by an approval node's permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RosterAction {
    Add,
    Remove,
    Transfer,
}

impl RosterAction {
    fn permission(&self) -> &'static str {
        match self {
            Self::Add => "add_approver",
            Self::Remove => "remove_approver",
            Self::Transfer => "transfer",
        }
    }

    fn allowed(&self, config: &ApprovalNodeConfig) -> bool {
        match self {
            Self::Add => config.permissions.allow_add_approver,
            Self::Remove => config.permissions.allow_remove_approver,
            Self::Transfer => config.permissions.allow_transfer,
        }
    }
}

/// Lifecycle operations over tasks created from stored templates
pub struct TaskManager {
    templates: Arc<dyn TemplateStore>,
    tasks: Arc<dyn TaskStore>,
    engine: WorkflowEngine,
    http_client: Option<Arc<dyn HttpClient>>,
    config: Config,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish()
    }
}

impl TaskManager {
    /// Manager over `templates` with an in-memory task store and default config
    pub fn new(templates: Arc<dyn TemplateStore>) -> Self {
        let config = Config::default();
        Self {
            templates,
            tasks: Arc::new(MemoryTaskStore::new()),
            engine: build_engine(&config, None),
            http_client: None,
            config,
        }
    }

    pub fn with_task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.engine = build_engine(&config, self.http_client.clone());
        self.config = config;
        self
    }

    /// Default transport for dynamic approvers without their own client
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self.engine = build_engine(&self.config, self.http_client.clone());
        self
    }

    /// Use a reqwest transport built from the resolver config
    pub fn with_default_http_client(self) -> Result<Self> {
        let client = ReqwestHttpClient::from_config(&self.config.resolver)
            .map_err(|e| FlowError::InvalidOperation(format!("{e:#}")))?;
        Ok(self.with_http_client(Arc::new(client)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    /// Create a `pending` task from the latest version of `template_id`
    pub async fn create(
        &self,
        template_id: &str,
        business_id: &str,
        params: Value,
    ) -> Result<Arc<Task>> {
        let template = Arc::new(self.templates.get(template_id, 0).await?);
        let id = uuid::Uuid::new_v4().to_string();
        let data = TaskData::new(id, &template, business_id, params);
        let task = Arc::new(Task::new(data, Arc::clone(&template)));

        {
            let mut data = task.write().await;
            self.engine
                .resolve_on_create(&mut data, &template, task.cache())
                .await;
        }

        self.tasks.insert(Arc::clone(&task)).await?;
        tracing::info!(
            "📝 Created task '{}' from template '{}' v{} (business id '{}')",
            task.id(),
            template.id,
            template.version,
            business_id
        );
        Ok(task)
    }

    /// `pending -> submitted`, then walk to the first approval node
    pub async fn submit(&self, task_id: &str) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        transition(&mut draft, TaskState::Submitted, "submitted")?;
        draft.submitted_at = Some(Utc::now());

        let outcome = self
            .engine
            .start(&mut draft, task.template(), task.cache())
            .await?;
        apply_outcome(&mut draft, &outcome)?;

        commit(&mut guard, draft);
        tracing::info!("📨 Task '{}' submitted", task_id);
        Ok(())
    }

    /// `submitted -> pending`; only before any record was written
    pub async fn withdraw(&self, task_id: &str, reason: &str) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        if draft.state != TaskState::Submitted {
            return Err(FlowError::InvalidStateTransition {
                from: draft.state,
                to: TaskState::Pending,
                reason: "withdraw is only allowed while submitted".to_string(),
            });
        }
        if !draft.records.is_empty() {
            return Err(FlowError::InvalidOperation(format!(
                "task '{task_id}' has {} record(s) and can no longer be withdrawn",
                draft.records.len()
            )));
        }

        transition(&mut draft, TaskState::Pending, reason)?;
        draft.submitted_at = None;
        draft.current_node.clear();
        draft.approvals.clear();

        commit(&mut guard, draft);
        tracing::info!("↩️ Task '{}' withdrawn: {}", task_id, reason);
        Ok(())
    }

    /// Any non-terminal state `-> cancelled`
    pub async fn cancel(&self, task_id: &str, reason: &str) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        transition(&mut draft, TaskState::Cancelled, reason)?;

        commit(&mut guard, draft);
        tracing::info!("🚫 Task '{}' cancelled: {}", task_id, reason);
        Ok(())
    }

    pub async fn add_approver(
        &self,
        task_id: &str,
        node_id: &str,
        user: &str,
        reason: &str,
    ) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        let (node, config) = roster_node(&draft, task.template(), node_id, RosterAction::Add)?;
        self.engine
            .ensure_approvers(&mut draft, task.template(), task.cache(), node)
            .await?;

        let approvers = draft.approvers.entry(node_id.to_string()).or_default();
        if approvers.iter().any(|existing| existing == user) {
            return Err(FlowError::InvalidOperation(format!(
                "user '{user}' is already an approver of node '{node_id}'"
            )));
        }
        if config.mode == ApprovalMode::Single && !approvers.is_empty() {
            return Err(FlowError::InvalidOperation(format!(
                "node '{node_id}' uses single mode and already has an approver"
            )));
        }
        approvers.push(user.to_string());
        draft.records.push(ApprovalRecord::roster_change(
            node_id,
            user,
            RecordAction::AddApprover,
            None,
            reason,
        ));

        commit(&mut guard, draft);
        tracing::info!("➕ Added approver '{}' to node '{}' of task '{}'", user, node_id, task_id);
        Ok(())
    }

    pub async fn remove_approver(
        &self,
        task_id: &str,
        node_id: &str,
        user: &str,
        reason: &str,
    ) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        let (_, config) = roster_node(&draft, task.template(), node_id, RosterAction::Remove)?;
        let position = seat_of(&draft, node_id, user)?;
        let approvers = draft.approvers.entry(node_id.to_string()).or_default();
        if approvers.len() <= config.min_approvers() {
            return Err(FlowError::InvalidOperation(format!(
                "cannot remove '{user}' from node '{node_id}': {} mode needs at least {} approver(s)",
                config.mode,
                config.min_approvers()
            )));
        }
        approvers.remove(position);
        draft.records.push(ApprovalRecord::roster_change(
            node_id,
            user,
            RecordAction::RemoveApprover,
            None,
            reason,
        ));

        self.reconcile(&task, &mut draft, node_id).await?;

        commit(&mut guard, draft);
        tracing::info!("➖ Removed approver '{}' from node '{}' of task '{}'", user, node_id, task_id);
        Ok(())
    }

    /// Hand `from`'s seat on `node_id` to `to`, keeping its position
    pub async fn transfer(
        &self,
        task_id: &str,
        node_id: &str,
        from: &str,
        to: &str,
        reason: &str,
    ) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        roster_node(&draft, task.template(), node_id, RosterAction::Transfer)?;
        let position = seat_of(&draft, node_id, from)?;
        let approvers = draft.approvers.entry(node_id.to_string()).or_default();
        if approvers.iter().any(|existing| existing == to) {
            return Err(FlowError::InvalidOperation(format!(
                "user '{to}' is already an approver of node '{node_id}'"
            )));
        }
        approvers[position] = to.to_string();
        draft.records.push(ApprovalRecord::roster_change(
            node_id,
            from,
            RecordAction::Transfer,
            Some(to.to_string()),
            reason,
        ));

        self.reconcile(&task, &mut draft, node_id).await?;

        commit(&mut guard, draft);
        tracing::info!(
            "🔁 Transferred node '{}' of task '{}' from '{}' to '{}'",
            node_id,
            task_id,
            from,
            to
        );
        Ok(())
    }

    pub async fn approve(
        &self,
        task_id: &str,
        node_id: &str,
        user: &str,
        comment: &str,
    ) -> Result<()> {
        self.decide(
            task_id,
            node_id,
            user,
            ApprovalResult::Approve,
            DecisionInput::comment(comment),
        )
        .await
    }

    pub async fn reject(
        &self,
        task_id: &str,
        node_id: &str,
        user: &str,
        comment: &str,
    ) -> Result<()> {
        self.decide(
            task_id,
            node_id,
            user,
            ApprovalResult::Reject,
            DecisionInput::comment(comment),
        )
        .await
    }

    /// Record `user`'s decision on the active node and advance the walk
    ///
    /// A node that still awaits other approvers is not an error.
    pub async fn decide(
        &self,
        task_id: &str,
        node_id: &str,
        user: &str,
        result: ApprovalResult,
        input: DecisionInput,
    ) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        let mut draft = guard.clone();

        if !matches!(draft.state, TaskState::Submitted | TaskState::Approving) {
            return Err(FlowError::InvalidStateTransition {
                from: draft.state,
                to: TaskState::Approving,
                reason: format!("cannot {result} a task that is {}", draft.state),
            });
        }

        let node = task
            .template()
            .node(node_id)
            .ok_or_else(|| FlowError::NodeNotFound(node_id.to_string()))?;
        if draft.current_node != node_id {
            return Err(FlowError::NodeNotActive {
                node_id: node_id.to_string(),
                current: draft.current_node.clone(),
            });
        }
        let config = node.approval_config().ok_or_else(|| {
            FlowError::InvalidOperation(format!("node '{node_id}' is not an approval node"))
        })?;

        if !draft.approvers_of(node_id).iter().any(|approver| approver == user) {
            return Err(FlowError::ApproverNotFound {
                node_id: node_id.to_string(),
                user: user.to_string(),
            });
        }
        if draft
            .approvals_of(node_id)
            .is_some_and(|approvals| approvals.contains_key(user))
        {
            return Err(FlowError::AlreadyDecided {
                node_id: node_id.to_string(),
                user: user.to_string(),
            });
        }
        if config.require_comment && input.comment.trim().is_empty() {
            return Err(FlowError::CommentRequired(node_id.to_string()));
        }
        if config.require_attachments && input.attachments.is_empty() {
            return Err(FlowError::AttachmentsRequired(node_id.to_string()));
        }

        if draft.state == TaskState::Submitted {
            transition(
                &mut draft,
                TaskState::Approving,
                format!("first decision on node '{node_id}'"),
            )?;
        }

        draft
            .approvals
            .entry(node_id.to_string())
            .or_default()
            .insert(user.to_string(), Approval::new(result, input.comment.clone()));
        draft
            .records
            .push(ApprovalRecord::decision(node_id, user, result, &input));

        let outcome = self
            .engine
            .resume(&mut draft, task.template(), task.cache())
            .await?;
        apply_outcome(&mut draft, &outcome)?;

        commit(&mut guard, draft);
        tracing::info!("🗳️ '{}' decided {} on node '{}' of task '{}'", user, result, node_id, task_id);
        Ok(())
    }

    /// Expire `node_id` if its timeout has elapsed; returns whether it fired
    pub async fn handle_timeout(&self, task_id: &str, node_id: &str) -> Result<bool> {
        self.handle_timeout_at(task_id, node_id, Utc::now()).await
    }

    /// [`Self::handle_timeout`] against an explicit clock
    pub async fn handle_timeout_at(
        &self,
        task_id: &str,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let task = self.tasks.get(task_id).await?;
        let mut guard = task.write().await;
        if guard.current_node != node_id {
            return Err(FlowError::NodeNotActive {
                node_id: node_id.to_string(),
                current: guard.current_node.clone(),
            });
        }
        expire_if_due(&task, &mut guard, now)
    }

    /// Expire every task whose active approval node has timed out
    ///
    /// Returns the IDs of the tasks moved to `timeout`.
    pub async fn check_timeouts(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut expired = Vec::new();
        for task in self.tasks.list().await? {
            let mut guard = task.write().await;
            if expire_if_due(&task, &mut guard, now)? {
                expired.push(task.id().to_string());
            }
        }
        if !expired.is_empty() {
            tracing::info!("⏰ {} task(s) timed out", expired.len());
        }
        Ok(expired)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Arc<Task>> {
        self.tasks.get(task_id).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Arc<Task>>> {
        self.tasks.list().await
    }

    pub async fn find_by_business_id(&self, business_id: &str) -> Result<Vec<Arc<Task>>> {
        let mut found = Vec::new();
        for task in self.tasks.list().await? {
            if task.business_id().await == business_id {
                found.push(task);
            }
        }
        Ok(found)
    }

    /// Re-check the active node after its approver list changed
    async fn reconcile(&self, task: &Task, draft: &mut TaskData, node_id: &str) -> Result<()> {
        if draft.state != TaskState::Approving || draft.current_node != node_id {
            return Ok(());
        }
        let outcome = self
            .engine
            .resume(draft, task.template(), task.cache())
            .await?;
        apply_outcome(draft, &outcome)
    }
}

fn build_engine(config: &Config, http_client: Option<Arc<dyn HttpClient>>) -> WorkflowEngine {
    WorkflowEngine::new(config.engine.clone(), RetryPolicy::from(&config.resolver))
        .with_http_client(http_client)
}

fn commit(guard: &mut RwLockWriteGuard<'_, TaskData>, mut draft: TaskData) {
    draft.updated_at = Utc::now();
    **guard = draft;
}

/// Map a walk result onto the task state machine
fn apply_outcome(task: &mut TaskData, outcome: &WalkOutcome) -> Result<()> {
    match outcome {
        WalkOutcome::Pending => Ok(()),
        WalkOutcome::Blocked { node_id } => {
            if task.state == TaskState::Approving {
                transition(
                    task,
                    TaskState::Approving,
                    format!("advanced to node '{node_id}'"),
                )?;
            }
            Ok(())
        }
        WalkOutcome::Finished { decision } => {
            if task.state == TaskState::Submitted {
                transition(task, TaskState::Approving, "no approval required")?;
            }
            match decision {
                Some(ApprovalResult::Reject) => {
                    transition(task, TaskState::Rejected, "end reached after rejection")
                }
                _ => transition(task, TaskState::Approved, "end reached"),
            }
        }
        WalkOutcome::Terminated { node_id } => {
            if task.state == TaskState::Submitted {
                transition(task, TaskState::Approving, "decision recorded")?;
            }
            transition(
                task,
                TaskState::Rejected,
                format!("rejected at node '{node_id}'"),
            )
        }
    }
}

/// Approval node targeted by a roster edit, with its permission checked
fn roster_node<'t>(
    task: &TaskData,
    template: &'t Template,
    node_id: &str,
    action: RosterAction,
) -> Result<(&'t Node, &'t ApprovalNodeConfig)> {
    if task.state.is_terminal() {
        return Err(FlowError::InvalidOperation(format!(
            "task '{}' is {} and can no longer change approvers",
            task.id, task.state
        )));
    }

    let node = template
        .node(node_id)
        .ok_or_else(|| FlowError::NodeNotFound(node_id.to_string()))?;
    let config = node.approval_config().ok_or_else(|| {
        FlowError::InvalidOperation(format!("node '{node_id}' is not an approval node"))
    })?;

    if !action.allowed(config) {
        return Err(FlowError::PermissionDenied {
            node_id: node_id.to_string(),
            permission: action.permission(),
        });
    }
    Ok((node, config))
}

/// Position of an undecided approver in the node's list
fn seat_of(task: &TaskData, node_id: &str, user: &str) -> Result<usize> {
    let position = task
        .approvers_of(node_id)
        .iter()
        .position(|approver| approver == user)
        .ok_or_else(|| FlowError::ApproverNotFound {
            node_id: node_id.to_string(),
            user: user.to_string(),
        })?;

    if task
        .approvals_of(node_id)
        .is_some_and(|approvals| approvals.contains_key(user))
    {
        return Err(FlowError::AlreadyDecided {
            node_id: node_id.to_string(),
            user: user.to_string(),
        });
    }
    Ok(position)
}

/// Move a task parked on an expired approval node to `timeout`
///
/// A `submitted` task whose first approval node expires passes through
/// `approving` on the way.
fn expire_if_due(task: &Task, data: &mut TaskData, now: DateTime<Utc>) -> Result<bool> {
    if !matches!(data.state, TaskState::Submitted | TaskState::Approving) {
        return Ok(false);
    }

    let node_id = data.current_node.clone();
    let Some(timeout) = task
        .template()
        .node(&node_id)
        .and_then(Node::approval_config)
        .and_then(ApprovalNodeConfig::timeout)
    else {
        return Ok(false);
    };
    let Some(&activated_at) = data.node_activated_at.get(&node_id) else {
        return Ok(false);
    };

    if now - activated_at <= timeout {
        return Ok(false);
    }

    let mut draft = data.clone();
    if draft.state == TaskState::Submitted {
        transition(
            &mut draft,
            TaskState::Approving,
            format!("node '{node_id}' expired before any decision"),
        )?;
    }
    transition(
        &mut draft,
        TaskState::Timeout,
        format!(
            "node '{node_id}' timed out after {}s",
            timeout.num_seconds()
        ),
    )?;
    draft.updated_at = Utc::now();
    *data = draft;
    tracing::warn!("⏰ Task '{}' timed out on node '{}'", data.id, node_id);
    Ok(true)
}
