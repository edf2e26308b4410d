/// Task lifecycle states and the legal transition table.

use super::types::TaskData;
use crate::error::{FlowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Submitted,
    Approving,
    Approved,
    Rejected,
    Timeout,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Approving => "approving",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Timeout | Self::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a task's state history
///
/// `from` is `None` only for the creation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: Option<TaskState>,
    pub to: TaskState,
    pub reason: String,
    pub time: DateTime<Utc>,
}

/// Whether `from -> to` is in the legal transition table
pub fn can_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;

    matches!(
        (from, to),
        (Pending, Submitted)
            | (Pending, Cancelled)
            | (Submitted, Approving)
            | (Submitted, Pending)
            | (Submitted, Cancelled)
            | (Approving, Approved)
            | (Approving, Rejected)
            | (Approving, Approving)
            | (Approving, Timeout)
            | (Approving, Cancelled)
    )
}

/// Move `task` to `to`, appending a history entry
///
/// Illegal moves leave the task untouched.
pub fn transition(task: &mut TaskData, to: TaskState, reason: impl Into<String>) -> Result<()> {
    let from = task.state;
    let reason = reason.into();

    if !can_transition(from, to) {
        return Err(FlowError::InvalidStateTransition { from, to, reason });
    }

    tracing::debug!("🔄 Task '{}': {} -> {} ({})", task.id, from, to, reason);
    task.state = to;
    task.state_history.push(StateChange {
        from: Some(from),
        to,
        reason,
        time: Utc::now(),
    });
    Ok(())
}
