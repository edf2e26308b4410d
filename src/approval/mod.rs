/// Approval-mode strategies
///
/// Each mode is a pure completion predicate over the node's approver list and
/// the decisions collected so far. The set of modes is closed, so dispatch is
/// a compile-time table ([`handler_for`]) rather than a runtime registry.

pub mod modes;

use crate::error::Result;
use crate::task::Approval;
use crate::template::ApprovalNodeConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use modes::{OrHandler, ProportionalHandler, SequentialHandler, SingleHandler, UnanimousHandler};

/// Completion rule for a multi-approver approval node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Exactly one approver decides
    Single,
    /// Every approver must decide; any rejection rejects
    Unanimous,
    /// First approval wins; rejected only when everyone rejects
    Or,
    /// Approved once `threshold.required` approvals are collected
    Proportional,
    /// Approvers decide one after another in list order
    Sequential,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Unanimous => "unanimous",
            Self::Or => "or",
            Self::Proportional => "proportional",
            Self::Sequential => "sequential",
        }
    }

    /// Strategy implementing this mode
    pub fn handler(&self) -> &'static dyn ApprovalModeHandler {
        handler_for(*self)
    }
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single approver's decision, and the outcome of a completed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalResult {
    Approve,
    Reject,
}

impl ApprovalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for ApprovalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completion check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// More decisions are needed
    Pending,
    /// The node is complete with the given outcome
    Complete(ApprovalResult),
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn result(&self) -> Option<ApprovalResult> {
        match self {
            Self::Complete(result) => Some(*result),
            Self::Pending => None,
        }
    }
}

/// Strategy deciding whether an approval node is complete
///
/// Implementations must be pure: no I/O, no mutation.
pub trait ApprovalModeHandler: Send + Sync {
    fn mode(&self) -> ApprovalMode;

    fn check_completion(
        &self,
        approvers: &[String],
        approvals: &HashMap<String, Approval>,
        config: &ApprovalNodeConfig,
    ) -> Result<Completion>;
}

/// Compile-time strategy table
pub fn handler_for(mode: ApprovalMode) -> &'static dyn ApprovalModeHandler {
    match mode {
        ApprovalMode::Single => &SingleHandler,
        ApprovalMode::Unanimous => &UnanimousHandler,
        ApprovalMode::Or => &OrHandler,
        ApprovalMode::Proportional => &ProportionalHandler,
        ApprovalMode::Sequential => &SequentialHandler,
    }
}
