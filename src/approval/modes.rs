/// The five built-in approval modes.

use super::{ApprovalMode, ApprovalModeHandler, ApprovalResult, Completion};
use crate::error::{FlowError, Result};
use crate::task::Approval;
use crate::template::ApprovalNodeConfig;
use std::collections::HashMap;

fn decision_of(approvals: &HashMap<String, Approval>, user: &str) -> Option<ApprovalResult> {
    approvals.get(user).map(|approval| approval.result)
}

/// Exactly one approver; their decision is the node outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleHandler;

impl ApprovalModeHandler for SingleHandler {
    fn mode(&self) -> ApprovalMode {
        ApprovalMode::Single
    }

    fn check_completion(
        &self,
        approvers: &[String],
        approvals: &HashMap<String, Approval>,
        _config: &ApprovalNodeConfig,
    ) -> Result<Completion> {
        match approvers {
            [only] => Ok(decision_of(approvals, only)
                .map(Completion::Complete)
                .unwrap_or(Completion::Pending)),
            _ => Ok(Completion::Pending),
        }
    }
}

/// Complete once every approver decided; any rejection rejects
#[derive(Debug, Clone, Copy, Default)]
pub struct UnanimousHandler;

impl ApprovalModeHandler for UnanimousHandler {
    fn mode(&self) -> ApprovalMode {
        ApprovalMode::Unanimous
    }

    fn check_completion(
        &self,
        approvers: &[String],
        approvals: &HashMap<String, Approval>,
        _config: &ApprovalNodeConfig,
    ) -> Result<Completion> {
        if approvers.len() < 2 {
            return Ok(Completion::Pending);
        }

        let mut rejected = false;
        for approver in approvers {
            match decision_of(approvals, approver) {
                None => return Ok(Completion::Pending),
                Some(ApprovalResult::Reject) => rejected = true,
                Some(ApprovalResult::Approve) => {}
            }
        }

        Ok(Completion::Complete(if rejected {
            ApprovalResult::Reject
        } else {
            ApprovalResult::Approve
        }))
    }
}

/// Any approval approves; rejected only when everyone rejected
#[derive(Debug, Clone, Copy, Default)]
pub struct OrHandler;

impl ApprovalModeHandler for OrHandler {
    fn mode(&self) -> ApprovalMode {
        ApprovalMode::Or
    }

    fn check_completion(
        &self,
        approvers: &[String],
        approvals: &HashMap<String, Approval>,
        _config: &ApprovalNodeConfig,
    ) -> Result<Completion> {
        if approvers.len() < 2 {
            return Ok(Completion::Pending);
        }

        let decisions: Vec<Option<ApprovalResult>> = approvers
            .iter()
            .map(|approver| decision_of(approvals, approver))
            .collect();

        if decisions.contains(&Some(ApprovalResult::Approve)) {
            return Ok(Completion::Complete(ApprovalResult::Approve));
        }
        if decisions.iter().all(|d| *d == Some(ApprovalResult::Reject)) {
            return Ok(Completion::Complete(ApprovalResult::Reject));
        }
        Ok(Completion::Pending)
    }
}

/// Approved once `proportional_threshold.required` approvals are in.
/// Rejections never complete the node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProportionalHandler;

impl ApprovalModeHandler for ProportionalHandler {
    fn mode(&self) -> ApprovalMode {
        ApprovalMode::Proportional
    }

    fn check_completion(
        &self,
        approvers: &[String],
        approvals: &HashMap<String, Approval>,
        config: &ApprovalNodeConfig,
    ) -> Result<Completion> {
        let threshold = config.proportional_threshold.ok_or_else(|| {
            FlowError::invalid_template("proportional mode requires proportional_threshold")
        })?;
        threshold.validate()?;

        let approved = approvers
            .iter()
            .filter(|approver| decision_of(approvals, approver) == Some(ApprovalResult::Approve))
            .count();

        if approved >= threshold.required as usize {
            Ok(Completion::Complete(ApprovalResult::Approve))
        } else {
            Ok(Completion::Pending)
        }
    }
}

/// Approvers decide in list order. A decision whose predecessor has not yet
/// decided stays idle until the predecessor acts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialHandler;

impl ApprovalModeHandler for SequentialHandler {
    fn mode(&self) -> ApprovalMode {
        ApprovalMode::Sequential
    }

    fn check_completion(
        &self,
        approvers: &[String],
        approvals: &HashMap<String, Approval>,
        _config: &ApprovalNodeConfig,
    ) -> Result<Completion> {
        if approvers.is_empty() {
            return Ok(Completion::Pending);
        }

        for approver in approvers {
            match decision_of(approvals, approver) {
                None => return Ok(Completion::Pending),
                Some(ApprovalResult::Reject) => {
                    return Ok(Completion::Complete(ApprovalResult::Reject))
                }
                Some(ApprovalResult::Approve) => {}
            }
        }
        Ok(Completion::Complete(ApprovalResult::Approve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approver::ApproverConfig;
    use crate::template::ProportionalThreshold;

    fn users(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn decisions(entries: &[(&str, ApprovalResult)]) -> HashMap<String, Approval> {
        entries
            .iter()
            .map(|(user, result)| (user.to_string(), Approval::new(*result, "")))
            .collect()
    }

    fn config(mode: ApprovalMode, approvers: &[&str]) -> ApprovalNodeConfig {
        ApprovalNodeConfig::new(mode, ApproverConfig::fixed(users(approvers)))
    }

    use ApprovalResult::{Approve, Reject};

    #[test]
    fn single_completes_with_the_only_decision() {
        let cfg = config(ApprovalMode::Single, &["u1"]);
        let approvers = users(&["u1"]);

        let pending = SingleHandler
            .check_completion(&approvers, &HashMap::new(), &cfg)
            .unwrap();
        assert_eq!(pending, Completion::Pending);

        let done = SingleHandler
            .check_completion(&approvers, &decisions(&[("u1", Reject)]), &cfg)
            .unwrap();
        assert_eq!(done, Completion::Complete(Reject));
    }

    #[test]
    fn single_ignores_multi_approver_lists() {
        let cfg = config(ApprovalMode::Single, &["u1"]);
        let done = SingleHandler
            .check_completion(&users(&["u1", "u2"]), &decisions(&[("u1", Approve)]), &cfg)
            .unwrap();
        assert_eq!(done, Completion::Pending);
    }

    #[test]
    fn unanimous_waits_for_everyone_then_rejects_on_any_reject() {
        let cfg = config(ApprovalMode::Unanimous, &["u1", "u2"]);
        let approvers = users(&["u1", "u2"]);

        let partial = UnanimousHandler
            .check_completion(&approvers, &decisions(&[("u1", Reject)]), &cfg)
            .unwrap();
        assert_eq!(partial, Completion::Pending);

        let done = UnanimousHandler
            .check_completion(&approvers, &decisions(&[("u1", Approve), ("u2", Reject)]), &cfg)
            .unwrap();
        assert_eq!(done, Completion::Complete(Reject));

        let approved = UnanimousHandler
            .check_completion(&approvers, &decisions(&[("u1", Approve), ("u2", Approve)]), &cfg)
            .unwrap();
        assert_eq!(approved, Completion::Complete(Approve));
    }

    #[test]
    fn or_approves_on_first_approval_and_rejects_only_when_all_reject() {
        let cfg = config(ApprovalMode::Or, &["u1", "u2", "u3"]);
        let approvers = users(&["u1", "u2", "u3"]);

        let first = OrHandler
            .check_completion(&approvers, &decisions(&[("u2", Approve)]), &cfg)
            .unwrap();
        assert_eq!(first, Completion::Complete(Approve));

        let two_rejects = OrHandler
            .check_completion(&approvers, &decisions(&[("u1", Reject), ("u2", Reject)]), &cfg)
            .unwrap();
        assert_eq!(two_rejects, Completion::Pending);

        let all_reject = OrHandler
            .check_completion(
                &approvers,
                &decisions(&[("u1", Reject), ("u2", Reject), ("u3", Reject)]),
                &cfg,
            )
            .unwrap();
        assert_eq!(all_reject, Completion::Complete(Reject));
    }

    #[test]
    fn proportional_counts_only_approvals() {
        let approvers = users(&["u1", "u2", "u3", "u4", "u5"]);
        let cfg = config(ApprovalMode::Proportional, &["u1", "u2", "u3", "u4", "u5"])
            .with_threshold(ProportionalThreshold::new(3, 5));

        let rejects = ProportionalHandler
            .check_completion(
                &approvers,
                &decisions(&[("u1", Reject), ("u2", Reject), ("u3", Reject), ("u4", Approve)]),
                &cfg,
            )
            .unwrap();
        assert_eq!(rejects, Completion::Pending);

        let met = ProportionalHandler
            .check_completion(
                &approvers,
                &decisions(&[("u5", Approve), ("u1", Approve), ("u3", Approve)]),
                &cfg,
            )
            .unwrap();
        assert_eq!(met, Completion::Complete(Approve));
    }

    #[test]
    fn proportional_with_full_threshold_behaves_like_unanimous_approval() {
        let approvers = users(&["u1", "u2"]);
        let cfg = config(ApprovalMode::Proportional, &["u1", "u2"])
            .with_threshold(ProportionalThreshold::new(2, 2));

        let one = ProportionalHandler
            .check_completion(&approvers, &decisions(&[("u1", Approve)]), &cfg)
            .unwrap();
        assert_eq!(one, Completion::Pending);

        let both = ProportionalHandler
            .check_completion(&approvers, &decisions(&[("u1", Approve), ("u2", Approve)]), &cfg)
            .unwrap();
        assert_eq!(both, Completion::Complete(Approve));
    }

    #[test]
    fn proportional_with_one_required_matches_or_when_approving() {
        let approvers = users(&["u1", "u2", "u3"]);
        let cfg = config(ApprovalMode::Proportional, &["u1", "u2", "u3"])
            .with_threshold(ProportionalThreshold::new(1, 3));

        let rejected = ProportionalHandler
            .check_completion(&approvers, &decisions(&[("u1", Reject)]), &cfg)
            .unwrap();
        assert_eq!(rejected, Completion::Pending);

        let all_rejected = ProportionalHandler
            .check_completion(
                &approvers,
                &decisions(&[("u1", Reject), ("u2", Reject), ("u3", Reject)]),
                &cfg,
            )
            .unwrap();
        assert_eq!(all_rejected, Completion::Pending);

        let approvals = decisions(&[("u1", Reject), ("u3", Approve)]);
        let approved = ProportionalHandler
            .check_completion(&approvers, &approvals, &cfg)
            .unwrap();
        assert_eq!(approved, Completion::Complete(Approve));
        let or_cfg = config(ApprovalMode::Or, &["u1", "u2", "u3"]);
        assert_eq!(
            OrHandler.check_completion(&approvers, &approvals, &or_cfg).unwrap(),
            approved
        );
    }

    #[test]
    fn proportional_rejects_bad_threshold() {
        let approvers = users(&["u1", "u2"]);
        let missing = config(ApprovalMode::Proportional, &["u1", "u2"]);
        assert!(ProportionalHandler
            .check_completion(&approvers, &HashMap::new(), &missing)
            .is_err());

        let inverted = missing.with_threshold(ProportionalThreshold::new(3, 2));
        assert!(ProportionalHandler
            .check_completion(&approvers, &HashMap::new(), &inverted)
            .is_err());
    }

    #[test]
    fn sequential_honours_order() {
        let cfg = config(ApprovalMode::Sequential, &["u1", "u2", "u3"]);
        let approvers = users(&["u1", "u2", "u3"]);

        let out_of_order = SequentialHandler
            .check_completion(&approvers, &decisions(&[("u2", Reject)]), &cfg)
            .unwrap();
        assert_eq!(out_of_order, Completion::Pending);

        let rejected = SequentialHandler
            .check_completion(&approvers, &decisions(&[("u1", Approve), ("u2", Reject)]), &cfg)
            .unwrap();
        assert_eq!(rejected, Completion::Complete(Reject));

        let approved = SequentialHandler
            .check_completion(
                &approvers,
                &decisions(&[("u1", Approve), ("u2", Approve), ("u3", Approve)]),
                &cfg,
            )
            .unwrap();
        assert_eq!(approved, Completion::Complete(Approve));
    }

    #[test]
    fn sequential_with_one_approver_matches_single() {
        let cfg = config(ApprovalMode::Sequential, &["u1"]);
        let approvers = users(&["u1"]);
        for result in [Approve, Reject] {
            let approvals = decisions(&[("u1", result)]);
            let sequential = SequentialHandler
                .check_completion(&approvers, &approvals, &cfg)
                .unwrap();
            let single = SingleHandler
                .check_completion(&approvers, &approvals, &cfg)
                .unwrap();
            assert_eq!(sequential, single);
        }
    }

    #[test]
    fn table_dispatches_every_mode() {
        for mode in [
            ApprovalMode::Single,
            ApprovalMode::Unanimous,
            ApprovalMode::Or,
            ApprovalMode::Proportional,
            ApprovalMode::Sequential,
        ] {
            assert_eq!(mode.handler().mode(), mode);
        }
    }
}
