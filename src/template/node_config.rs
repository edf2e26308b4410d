/// Per-node-type configuration
///
/// Approval and condition nodes carry typed configs; start and end nodes carry none.

use crate::approval::ApprovalMode;
use crate::approver::ApproverConfig;
use crate::condition::Condition;
use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};

/// Polymorphic node configuration
///
/// Untagged on the wire: an object with `mode` + `approver_config` is an
/// approval config, one with `condition` + branch targets is a condition config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeConfig {
    Approval(ApprovalNodeConfig),
    Condition(ConditionNodeConfig),
}

/// How a rejection at an approval node steers the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectBehavior {
    /// Mark the task rejected
    #[default]
    Terminate,
    /// Re-run the immediately preceding approval node
    Rollback,
    /// Continue at `reject_target_node`
    Jump,
}

/// Operator actions allowed on an approval node's approver list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalPermissions {
    #[serde(default)]
    pub allow_transfer: bool,
    #[serde(default)]
    pub allow_add_approver: bool,
    #[serde(default)]
    pub allow_remove_approver: bool,
}

impl ApprovalPermissions {
    /// Every operator action enabled
    pub fn all() -> Self {
        Self {
            allow_transfer: true,
            allow_add_approver: true,
            allow_remove_approver: true,
        }
    }
}

/// `required` approvals out of `total` for proportional mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProportionalThreshold {
    pub required: u32,
    pub total: u32,
}

impl ProportionalThreshold {
    pub fn new(required: u32, total: u32) -> Self {
        Self { required, total }
    }

    pub fn validate(&self) -> Result<()> {
        if self.required == 0 || self.total == 0 {
            return Err(FlowError::invalid_template(
                "proportional threshold requires required > 0 and total > 0",
            ));
        }
        if self.required > self.total {
            return Err(FlowError::invalid_template(format!(
                "proportional threshold required ({}) exceeds total ({})",
                self.required, self.total
            )));
        }
        Ok(())
    }
}

/// Configuration of an approval node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalNodeConfig {
    /// Completion rule
    pub mode: ApprovalMode,
    /// Where the node's approvers come from
    pub approver_config: ApproverConfig,
    /// Seconds the node may stay active before a timeout check fires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub reject_behavior: RejectBehavior,
    /// Target node for `RejectBehavior::Jump`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_target_node: Option<String>,
    #[serde(default)]
    pub permissions: ApprovalPermissions,
    #[serde(default)]
    pub require_comment: bool,
    #[serde(default)]
    pub require_attachments: bool,
    /// Required for `ApprovalMode::Proportional`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportional_threshold: Option<ProportionalThreshold>,
}

impl ApprovalNodeConfig {
    pub fn new(mode: ApprovalMode, approver_config: ApproverConfig) -> Self {
        Self {
            mode,
            approver_config,
            timeout_secs: None,
            reject_behavior: RejectBehavior::Terminate,
            reject_target_node: None,
            permissions: ApprovalPermissions::default(),
            require_comment: false,
            require_attachments: false,
            proportional_threshold: None,
        }
    }

    pub fn with_reject_behavior(mut self, behavior: RejectBehavior) -> Self {
        self.reject_behavior = behavior;
        self
    }

    /// Shorthand for `RejectBehavior::Jump` to `target`
    pub fn with_reject_jump(mut self, target: impl Into<String>) -> Self {
        self.reject_behavior = RejectBehavior::Jump;
        self.reject_target_node = Some(target.into());
        self
    }

    pub fn with_permissions(mut self, permissions: ApprovalPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_threshold(mut self, threshold: ProportionalThreshold) -> Self {
        self.proportional_threshold = Some(threshold);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_required_comment(mut self) -> Self {
        self.require_comment = true;
        self
    }

    pub fn with_required_attachments(mut self) -> Self {
        self.require_attachments = true;
        self
    }

    /// `None` when unset or too large to represent
    pub fn timeout(&self) -> Option<chrono::Duration> {
        self.timeout_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
    }

    /// Fewest approvers the mode can complete with
    pub fn min_approvers(&self) -> usize {
        match self.mode {
            ApprovalMode::Single | ApprovalMode::Sequential => 1,
            ApprovalMode::Unanimous | ApprovalMode::Or => 2,
            ApprovalMode::Proportional => self
                .proportional_threshold
                .map_or(1, |threshold| threshold.required.max(1) as usize),
        }
    }

    /// Validate the config in isolation (graph references are checked by the template)
    pub fn validate(&self) -> Result<()> {
        self.approver_config.validate()?;

        if self.timeout_secs == Some(0) {
            return Err(FlowError::invalid_template("approval timeout must be > 0"));
        }
        if let (Some(secs), None) = (self.timeout_secs, self.timeout()) {
            return Err(FlowError::invalid_template(format!(
                "approval timeout of {secs}s is out of range"
            )));
        }

        if self.reject_behavior == RejectBehavior::Jump
            && self.reject_target_node.as_deref().map_or(true, str::is_empty)
        {
            return Err(FlowError::invalid_template(
                "reject_behavior 'jump' requires reject_target_node",
            ));
        }

        if self.mode == ApprovalMode::Proportional {
            let threshold = self.proportional_threshold.ok_or_else(|| {
                FlowError::invalid_template("proportional mode requires proportional_threshold")
            })?;
            threshold.validate()?;
        }

        if let Some(count) = self.approver_config.fixed_count() {
            match self.mode {
                ApprovalMode::Single if count != 1 => {
                    return Err(FlowError::invalid_template(format!(
                        "single mode requires exactly one approver, got {count}"
                    )));
                }
                _ if count < self.min_approvers() => {
                    return Err(FlowError::invalid_template(format!(
                        "{} mode requires at least {} approvers, got {count}",
                        self.mode,
                        self.min_approvers()
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Configuration of a condition node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionNodeConfig {
    pub condition: Condition,
    pub true_node_id: String,
    pub false_node_id: String,
}

impl ConditionNodeConfig {
    pub fn new(
        condition: Condition,
        true_node_id: impl Into<String>,
        false_node_id: impl Into<String>,
    ) -> Self {
        Self {
            condition,
            true_node_id: true_node_id.into(),
            false_node_id: false_node_id.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.true_node_id.is_empty() || self.false_node_id.is_empty() {
            return Err(FlowError::invalid_template(
                "condition node requires both true_node_id and false_node_id",
            ));
        }
        self.condition.validate()
    }
}
