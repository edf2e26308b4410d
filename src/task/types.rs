/// Task data model
///
/// A task is one run of a template version. Everything the engine knows about
/// it lives in [`TaskData`]; the locked [`super::Task`] handle guards it.

use super::state::{StateChange, TaskState};
use crate::approval::ApprovalResult;
use crate::runtime::NodeEvent;
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskData {
    pub id: String,
    pub template_id: String,
    /// Template version bound at creation
    pub template_version: u32,
    /// Caller's reference for the business object under approval
    pub business_id: String,
    pub state: TaskState,
    /// Node the task is parked on; empty before submission
    pub current_node: String,
    pub params: Value,
    /// Resolved approvers per approval node
    pub approvers: HashMap<String, Vec<String>>,
    /// Decisions of the current activation, per node then per user
    pub approvals: HashMap<String, HashMap<String, Approval>>,
    /// Append-only audit log of operator actions
    pub records: Vec<ApprovalRecord>,
    /// Append-only log of state transitions
    pub state_history: Vec<StateChange>,
    pub node_outputs: HashMap<String, Value>,
    /// Append-only log of executor events
    pub events: Vec<NodeEvent>,
    /// Last activation time per node
    pub node_activated_at: HashMap<String, DateTime<Utc>>,
    /// Nodes in activation order
    pub node_path: Vec<String>,
    /// Outcome of the most recently completed approval node
    pub last_decision: Option<ApprovalResult>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TaskData {
    /// Fresh `pending` task bound to `template`
    pub fn new(
        id: impl Into<String>,
        template: &Template,
        business_id: impl Into<String>,
        params: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            template_id: template.id.clone(),
            template_version: template.version,
            business_id: business_id.into(),
            state: TaskState::Pending,
            current_node: String::new(),
            params,
            approvers: HashMap::new(),
            approvals: HashMap::new(),
            records: Vec::new(),
            state_history: vec![StateChange {
                from: None,
                to: TaskState::Pending,
                reason: "task created".to_string(),
                time: now,
            }],
            node_outputs: HashMap::new(),
            events: Vec::new(),
            node_activated_at: HashMap::new(),
            node_path: Vec::new(),
            last_decision: None,
            created_at: now,
            submitted_at: None,
            updated_at: now,
        }
    }

    pub fn approvers_of(&self, node_id: &str) -> &[String] {
        self.approvers.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn approvals_of(&self, node_id: &str) -> Option<&HashMap<String, Approval>> {
        self.approvals.get(node_id)
    }
}

/// One approver's decision on a node activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub result: ApprovalResult,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(result: ApprovalResult, comment: impl Into<String>) -> Self {
        Self {
            result,
            comment: comment.into(),
            created_at: Utc::now(),
        }
    }
}

/// Operator action recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Approve,
    Reject,
    Transfer,
    AddApprover,
    RemoveApprover,
}

impl RecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Transfer => "transfer",
            Self::AddApprover => "add_approver",
            Self::RemoveApprover => "remove_approver",
        }
    }
}

impl From<ApprovalResult> for RecordAction {
    fn from(result: ApprovalResult) -> Self {
        match result {
            ApprovalResult::Approve => Self::Approve,
            ApprovalResult::Reject => Self::Reject,
        }
    }
}

/// Immutable audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub node_id: String,
    /// User who performed the action
    pub approver: String,
    pub action: RecordAction,
    /// Set for approve / reject actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ApprovalResult>,
    /// Comment or reason supplied with the action
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Receiving user of a transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn decision(
        node_id: impl Into<String>,
        approver: impl Into<String>,
        result: ApprovalResult,
        input: &DecisionInput,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            approver: approver.into(),
            action: result.into(),
            result: Some(result),
            comment: input.comment.clone(),
            attachments: input.attachments.clone(),
            target_user: None,
            created_at: Utc::now(),
        }
    }

    /// Add / remove / transfer entry; `approver` is the user whose seat changed
    pub fn roster_change(
        node_id: impl Into<String>,
        approver: impl Into<String>,
        action: RecordAction,
        target_user: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            approver: approver.into(),
            action,
            result: None,
            comment: reason.into(),
            attachments: Vec::new(),
            target_user,
            created_at: Utc::now(),
        }
    }
}

/// Extra input accompanying an approve / reject decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    #[serde(default)]
    pub comment: String,
    /// Attachment references (URLs or storage keys)
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl DecisionInput {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }
}
