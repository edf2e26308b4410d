mod common;

use approvalflow::task::{can_transition, RecordAction};
use approvalflow::template::{ApprovalPermissions, ProportionalThreshold, RejectBehavior};
use approvalflow::{
    ApprovalMode, ApprovalResult, DecisionInput, ErrorKind, FlowError, Node, TaskData, TaskState,
    Template, TemplateStore,
};
use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{fixed, linear, manager_with, two_step, users};
use serde_json::json;

fn assert_history_chains(task: &TaskData) {
    let history = &task.state_history;
    assert_eq!(history[0].from, None);
    assert_eq!(history[0].to, TaskState::Pending);
    for pair in history.windows(2) {
        assert_eq!(pair[0].to, pair[1].from.unwrap());
        assert!(can_transition(pair[0].to, pair[1].to));
    }
}

#[tokio::test]
async fn history_chains_through_a_multi_step_run() {
    let manager = manager_with(vec![two_step(
        "tpl-two",
        fixed(ApprovalMode::Or, &["a", "b"]),
        fixed(ApprovalMode::Sequential, &["c", "d"]),
    )])
    .await;

    let task = manager.create("tpl-two", "po-1", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();
    manager.approve(task.id(), "first", "b", "").await.unwrap();
    assert_eq!(task.current_node().await, "second");
    manager.approve(task.id(), "second", "c", "").await.unwrap();
    manager.approve(task.id(), "second", "d", "").await.unwrap();

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Approved);
    assert_history_chains(&data);
    assert_eq!(data.node_path, vec!["start", "first", "second", "end"]);
    assert!(data
        .state_history
        .iter()
        .any(|change| change.reason.contains("advanced to node 'second'")));
}

#[tokio::test]
async fn template_without_approvals_is_approved_on_submit() {
    let template = Template::new("tpl-auto", "Auto")
        .with_node(Node::start("start"))
        .with_node(Node::end("end"))
        .with_edge("start", "end");
    let manager = manager_with(vec![template]).await;

    let task = manager.create("tpl-auto", "auto-1", json!({ "x": 1 })).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Approved);
    assert_history_chains(&data);
    assert_eq!(data.node_outputs["start"], json!({ "x": 1 }));
    assert_eq!(data.events.len(), 2);
}

#[tokio::test]
async fn cancel_twice_fails_without_mutation() {
    let manager = manager_with(vec![linear("tpl", fixed(ApprovalMode::Single, &["u1"]))]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();

    manager.cancel(task.id(), "no longer needed").await.unwrap();
    let before = task.snapshot().await;

    let err = manager.cancel(task.id(), "again").await.unwrap_err();
    assert_matches!(
        err,
        FlowError::InvalidStateTransition {
            from: TaskState::Cancelled,
            to: TaskState::Cancelled,
            ..
        }
    );

    let after = task.snapshot().await;
    assert_eq!(after.state_history, before.state_history);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn withdraw_then_submit_refreshes_submission() {
    let manager = manager_with(vec![linear("tpl", fixed(ApprovalMode::Single, &["u1"]))]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();

    manager.submit(task.id()).await.unwrap();
    let first_submit = task.snapshot().await.submitted_at.unwrap();

    manager.withdraw(task.id(), "typo in request").await.unwrap();
    let withdrawn = task.snapshot().await;
    assert_eq!(withdrawn.state, TaskState::Pending);
    assert!(withdrawn.submitted_at.is_none());
    assert!(withdrawn.current_node.is_empty());

    manager.submit(task.id()).await.unwrap();
    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Submitted);
    assert!(data.submitted_at.unwrap() >= first_submit);
    assert!(data.records.is_empty());
    assert_eq!(data.current_node, "approve");
    assert_history_chains(&data);
}

#[tokio::test]
async fn withdraw_is_refused_once_records_exist() {
    let config = fixed(ApprovalMode::Unanimous, &["u1", "u2"]).with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.add_approver(task.id(), "approve", "u3", "extra reviewer").await.unwrap();

    let err = manager.withdraw(task.id(), "oops").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(task.state().await, TaskState::Submitted);

    manager.approve(task.id(), "approve", "u1", "").await.unwrap();
    assert_matches!(
        manager.withdraw(task.id(), "too late").await,
        Err(FlowError::InvalidStateTransition { from: TaskState::Approving, .. })
    );
}

#[tokio::test]
async fn second_decision_by_same_user_is_rejected() {
    let manager = manager_with(vec![linear(
        "tpl",
        fixed(ApprovalMode::Unanimous, &["u1", "u2"]),
    )])
    .await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.approve(task.id(), "approve", "u1", "").await.unwrap();
    let before = task.snapshot().await;

    assert_matches!(
        manager.reject(task.id(), "approve", "u1", "changed my mind").await,
        Err(FlowError::AlreadyDecided { user, .. }) if user == "u1"
    );
    let after = task.snapshot().await;
    assert_eq!(after.records, before.records);
    assert_eq!(after.approvals, before.approvals);
}

#[tokio::test]
async fn sequential_waits_for_predecessor() {
    let manager = manager_with(vec![linear(
        "tpl",
        fixed(ApprovalMode::Sequential, &["u1", "u2"]),
    )])
    .await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.approve(task.id(), "approve", "u2", "early").await.unwrap();
    assert_eq!(task.state().await, TaskState::Approving);
    assert_eq!(task.current_node().await, "approve");

    manager.approve(task.id(), "approve", "u1", "").await.unwrap();
    assert_eq!(task.state().await, TaskState::Approved);
}

#[tokio::test]
async fn decisions_are_checked_against_roster_and_active_node() {
    let manager = manager_with(vec![two_step(
        "tpl",
        fixed(ApprovalMode::Single, &["u1"]),
        fixed(ApprovalMode::Single, &["u2"]),
    )])
    .await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();

    assert_matches!(
        manager.approve(task.id(), "first", "u1", "").await,
        Err(FlowError::InvalidStateTransition { from: TaskState::Pending, .. })
    );

    manager.submit(task.id()).await.unwrap();

    assert_matches!(
        manager.approve(task.id(), "first", "mallory", "").await,
        Err(FlowError::ApproverNotFound { .. })
    );
    assert_matches!(
        manager.approve(task.id(), "second", "u2", "").await,
        Err(FlowError::NodeNotActive { current, .. }) if current == "first"
    );
    assert_matches!(
        manager.approve(task.id(), "ghost", "u2", "").await,
        Err(FlowError::NodeNotFound(_))
    );
    assert_matches!(
        manager.approve("missing-task", "first", "u1", "").await,
        Err(FlowError::TaskNotFound(_))
    );
    assert!(task.records().await.is_empty());
}

#[tokio::test]
async fn comment_and_attachments_requirements() {
    let config = fixed(ApprovalMode::Single, &["u1"])
        .with_required_comment()
        .with_required_attachments();
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    assert_matches!(
        manager.approve(task.id(), "approve", "u1", "   ").await,
        Err(FlowError::CommentRequired(_))
    );
    assert_matches!(
        manager.approve(task.id(), "approve", "u1", "looks good").await,
        Err(FlowError::AttachmentsRequired(_))
    );

    manager
        .decide(
            task.id(),
            "approve",
            "u1",
            ApprovalResult::Approve,
            DecisionInput::comment("looks good").with_attachment("s3://receipts/1.pdf"),
        )
        .await
        .unwrap();

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Approved);
    assert_eq!(data.records[0].attachments, vec!["s3://receipts/1.pdf"]);
}

#[tokio::test]
async fn roster_edits_need_permission() {
    let manager = manager_with(vec![linear(
        "tpl",
        fixed(ApprovalMode::Unanimous, &["u1", "u2"]),
    )])
    .await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    assert_matches!(
        manager.transfer(task.id(), "approve", "u1", "u9", "").await,
        Err(FlowError::PermissionDenied { permission: "transfer", .. })
    );
    assert_matches!(
        manager.add_approver(task.id(), "approve", "u9", "").await,
        Err(FlowError::PermissionDenied { permission: "add_approver", .. })
    );
    assert_matches!(
        manager.remove_approver(task.id(), "approve", "u1", "").await,
        Err(FlowError::PermissionDenied { permission: "remove_approver", .. })
    );
    assert_eq!(task.approvers("approve").await, users(&["u1", "u2"]));
}

#[tokio::test]
async fn transfer_hands_over_the_seat() {
    let config = fixed(ApprovalMode::Sequential, &["u1", "u2"]).with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.transfer(task.id(), "approve", "u1", "u9", "on leave").await.unwrap();
    assert_eq!(task.approvers("approve").await, users(&["u9", "u2"]));

    let records = task.records().await;
    assert_eq!(records[0].action, RecordAction::Transfer);
    assert_eq!(records[0].target_user.as_deref(), Some("u9"));

    assert_matches!(
        manager.approve(task.id(), "approve", "u1", "").await,
        Err(FlowError::ApproverNotFound { .. })
    );
    manager.approve(task.id(), "approve", "u9", "").await.unwrap();
    manager.approve(task.id(), "approve", "u2", "").await.unwrap();
    assert_eq!(task.state().await, TaskState::Approved);
}

#[tokio::test]
async fn added_approver_must_decide_too() {
    let config = fixed(ApprovalMode::Unanimous, &["u1", "u2"]).with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.add_approver(task.id(), "approve", "u3", "security review").await.unwrap();
    assert_eq!(
        manager.add_approver(task.id(), "approve", "u3", "").await.unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );

    manager.approve(task.id(), "approve", "u1", "").await.unwrap();
    manager.approve(task.id(), "approve", "u2", "").await.unwrap();
    assert_eq!(task.state().await, TaskState::Approving);

    manager.approve(task.id(), "approve", "u3", "").await.unwrap();
    assert_eq!(task.state().await, TaskState::Approved);
}

#[tokio::test]
async fn removing_the_last_holdout_completes_the_node() {
    let config = fixed(ApprovalMode::Unanimous, &["u1", "u2", "u3"])
        .with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.approve(task.id(), "approve", "u1", "").await.unwrap();
    manager.approve(task.id(), "approve", "u2", "").await.unwrap();

    assert_matches!(
        manager.remove_approver(task.id(), "approve", "u1", "").await,
        Err(FlowError::AlreadyDecided { .. })
    );
    manager.remove_approver(task.id(), "approve", "u3", "left the company").await.unwrap();

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Approved);
    assert_eq!(data.approvers["approve"], users(&["u1", "u2"]));
    assert_history_chains(&data);
}

#[tokio::test]
async fn removal_cannot_drop_below_the_mode_minimum() {
    let config = fixed(ApprovalMode::Unanimous, &["u1", "u2"]).with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();
    manager.approve(task.id(), "approve", "u1", "").await.unwrap();

    assert_eq!(
        manager.remove_approver(task.id(), "approve", "u2", "").await.unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
    assert_eq!(task.approvers("approve").await, users(&["u1", "u2"]));

    manager.approve(task.id(), "approve", "u2", "").await.unwrap();
    assert_eq!(task.state().await, TaskState::Approved);
}

#[tokio::test]
async fn proportional_removal_keeps_enough_seats_for_the_threshold() {
    let config = fixed(ApprovalMode::Proportional, &["u1", "u2", "u3"])
        .with_threshold(ProportionalThreshold::new(2, 3))
        .with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.remove_approver(task.id(), "approve", "u3", "").await.unwrap();
    assert_matches!(
        manager.remove_approver(task.id(), "approve", "u2", "").await,
        Err(FlowError::InvalidOperation(msg)) if msg.contains("at least 2")
    );
    assert_eq!(task.approvers("approve").await, users(&["u1", "u2"]));
}

#[tokio::test]
async fn single_mode_keeps_one_approver() {
    let config = fixed(ApprovalMode::Single, &["u1"]).with_permissions(ApprovalPermissions::all());
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();

    assert_eq!(
        manager.add_approver(task.id(), "approve", "u2", "").await.unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
    assert_eq!(
        manager.remove_approver(task.id(), "approve", "u1", "").await.unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );

    manager.cancel(task.id(), "").await.unwrap();
    assert_eq!(
        manager.transfer(task.id(), "approve", "u1", "u2", "").await.unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
}

#[tokio::test]
async fn timeout_fires_only_after_deadline() {
    let config = fixed(ApprovalMode::Unanimous, &["u1", "u2"]).with_timeout_secs(3600);
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    let later = Utc::now() + Duration::hours(2);
    assert!(!manager
        .handle_timeout_at(task.id(), "approve", Utc::now() + Duration::minutes(30))
        .await
        .unwrap());
    assert_eq!(task.state().await, TaskState::Submitted);

    manager.approve(task.id(), "approve", "u1", "").await.unwrap();
    assert!(!manager
        .handle_timeout_at(task.id(), "approve", Utc::now() + Duration::minutes(30))
        .await
        .unwrap());
    assert_matches!(
        manager.handle_timeout_at(task.id(), "start", later).await,
        Err(FlowError::NodeNotActive { .. })
    );

    assert!(manager.handle_timeout_at(task.id(), "approve", later).await.unwrap());
    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Timeout);
    assert_history_chains(&data);

    assert_matches!(
        manager.approve(task.id(), "approve", "u2", "").await,
        Err(FlowError::InvalidStateTransition { from: TaskState::Timeout, .. })
    );
}

#[tokio::test]
async fn untouched_first_node_times_out() {
    let config = fixed(ApprovalMode::Single, &["u1"]).with_timeout_secs(60);
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();
    assert_eq!(task.state().await, TaskState::Submitted);

    let much_later = Utc::now() + Duration::days(30);
    assert!(manager.handle_timeout_at(task.id(), "approve", much_later).await.unwrap());

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Timeout);
    let states: Vec<TaskState> = data.state_history.iter().map(|change| change.to).collect();
    assert_eq!(
        states,
        vec![
            TaskState::Pending,
            TaskState::Submitted,
            TaskState::Approving,
            TaskState::Timeout
        ]
    );
    assert_history_chains(&data);
    assert!(!manager.handle_timeout_at(task.id(), "approve", much_later).await.unwrap());
}

#[tokio::test]
async fn check_timeouts_sweeps_every_task() {
    let config = fixed(ApprovalMode::Or, &["u1", "u2"]).with_timeout_secs(60);
    let manager = manager_with(vec![linear("tpl", config)]).await;

    let mut approving = Vec::new();
    for business_id in ["b1", "b2"] {
        let task = manager.create("tpl", business_id, json!({})).await.unwrap();
        manager.submit(task.id()).await.unwrap();
        manager.reject(task.id(), "approve", "u1", "").await.unwrap();
        approving.push(task);
    }
    let waiting = manager.create("tpl", "b4", json!({})).await.unwrap();
    manager.submit(waiting.id()).await.unwrap();
    approving.push(waiting);
    let idle = manager.create("tpl", "b3", json!({})).await.unwrap();

    let mut expired = manager
        .check_timeouts(Utc::now() + Duration::minutes(5))
        .await
        .unwrap();
    expired.sort();
    let mut expected: Vec<String> = approving.iter().map(|t| t.id().to_string()).collect();
    expected.sort();
    assert_eq!(expired, expected);
    assert_eq!(idle.state().await, TaskState::Pending);
}

#[tokio::test]
async fn jump_on_reject_reopens_earlier_node() {
    let second = fixed(ApprovalMode::Single, &["u2"]).with_reject_jump("first");
    let manager = manager_with(vec![two_step(
        "tpl",
        fixed(ApprovalMode::Single, &["u1"]),
        second,
    )])
    .await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.approve(task.id(), "first", "u1", "").await.unwrap();
    manager.reject(task.id(), "second", "u2", "needs rework").await.unwrap();

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Approving);
    assert_eq!(data.current_node, "first");
    assert!(data.approvals_of("first").map_or(true, |a| a.is_empty()));

    manager.approve(task.id(), "first", "u1", "fixed").await.unwrap();
    manager.approve(task.id(), "second", "u2", "").await.unwrap();

    let data = task.snapshot().await;
    assert_eq!(data.state, TaskState::Approved);
    assert_eq!(
        data.node_path,
        vec!["start", "first", "second", "first", "second", "end"]
    );
    assert_history_chains(&data);
}

#[tokio::test]
async fn jump_to_end_after_reject_rejects_the_task() {
    let config = fixed(ApprovalMode::Single, &["u1"]).with_reject_jump("end");
    let manager = manager_with(vec![linear("tpl", config)]).await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.reject(task.id(), "approve", "u1", "").await.unwrap();
    assert_eq!(task.state().await, TaskState::Rejected);
}

#[tokio::test]
async fn rollback_returns_to_preceding_approval() {
    let second = fixed(ApprovalMode::Single, &["u2"]).with_reject_behavior(RejectBehavior::Rollback);
    let manager = manager_with(vec![two_step(
        "tpl",
        fixed(ApprovalMode::Single, &["u1"]),
        second,
    )])
    .await;
    let task = manager.create("tpl", "b", json!({})).await.unwrap();
    manager.submit(task.id()).await.unwrap();

    manager.approve(task.id(), "first", "u1", "").await.unwrap();
    manager.reject(task.id(), "second", "u2", "").await.unwrap();
    assert_eq!(task.current_node().await, "first");
    assert_eq!(task.state().await, TaskState::Approving);
}

#[tokio::test]
async fn tasks_stay_pinned_to_their_template_version() {
    let manager = manager_with(vec![linear("tpl", fixed(ApprovalMode::Single, &["u1"]))]).await;
    let old = manager.create("tpl", "b", json!({})).await.unwrap();

    let version = manager
        .templates()
        .update("tpl", linear("tpl", fixed(ApprovalMode::Single, &["u2"])))
        .await
        .unwrap();
    assert_eq!(version, 2);

    let new = manager.create("tpl", "b", json!({})).await.unwrap();
    assert_eq!(old.snapshot().await.template_version, 1);
    assert_eq!(new.snapshot().await.template_version, 2);
    assert_eq!(old.approvers("approve").await, users(&["u1"]));
    assert_eq!(new.approvers("approve").await, users(&["u2"]));

    let mut found: Vec<String> = manager
        .find_by_business_id("b")
        .await
        .unwrap()
        .iter()
        .map(|task| task.id().to_string())
        .collect();
    found.sort();
    let mut expected = vec![old.id().to_string(), new.id().to_string()];
    expected.sort();
    assert_eq!(found, expected);
    assert_eq!(manager.list_tasks().await.unwrap().len(), 2);
}
