// pipeline.rs — End-to-end tests of the plan gate through the runtime.
//
// Each test builds a throwaway workspace with a `docs/` tree, a policy that
// admits two users, and a draft client that hands out pre-written drafts in
// order. Everything else (SQLite store, JSONL audit chain, diff artifacts)
// is the real thing, living under the workspace's `.anzen/` directory.
//
// VERIFY across the suite:
//   - plans are created PENDING_APPROVAL with the expected risk
//   - approval needs the owner, the right token, and a non-blocked level
//   - execution re-checks everything and never rolls back
//   - every lifecycle step lands in a hash chain the store agrees with

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::{tempdir, TempDir};

use anzen_approval::ApprovalError;
use anzen_audit::{AuditError, AuditEventType, GENESIS};
use anzen_executor::{ExecutionError, OpFailure};
use anzen_plan::patch::encode_envelope;
use anzen_plan::{DraftOp, DraftPlan, Plan, PlanStatus, RequestedBy, RiskLevel};
use anzen_policy::{EngineMode, PathGuardViolation, PolicyConfig};
use anzen_runtime::{
    ChatEngine, CollaboratorError, DraftRequest, PlanDraftClient, PolicyViolation, Runtime,
    RuntimeConfig, RuntimeError, MAX_CHAT_ANSWER_CHARS,
};

const OWNER: i64 = 101;
const OTHER: i64 = 202;
const STRANGER: i64 = 303;
const CHAT: i64 = 9;

/// Hands out drafts in order; runs dry after the last one.
struct QueuedDrafts(Mutex<VecDeque<DraftPlan>>);

impl PlanDraftClient for QueuedDrafts {
    fn draft_plan(&self, _request: &DraftRequest) -> Result<DraftPlan, CollaboratorError> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CollaboratorError::Unavailable("no more drafts".into()))
    }
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    runtime: Runtime,
}

fn harness_with(drafts: Vec<DraftPlan>, chat: ChatEngine, tweak: impl FnOnce(&mut PolicyConfig)) -> Harness {
    let dir = tempdir().unwrap();
    let root = dir.path().to_path_buf();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("docs/a.md"), "# A\n\nfirst\nsecond\n").unwrap();

    let mut policy = PolicyConfig::default();
    policy.version = "pol_test".into();
    policy.users.allowlist_user_ids = vec![OWNER, OTHER];
    policy.rate_limit.command_per_minute = 1000;
    policy.rate_limit.plan_per_minute = 1000;
    policy.rate_limit.approve_per_minute = 1000;
    policy.engine.mode = EngineMode::Scripted;
    tweak(&mut policy);

    let config = RuntimeConfig::for_workspace(&root, policy);
    let runtime = Runtime::open(
        config,
        Box::new(QueuedDrafts(Mutex::new(drafts.into()))),
        Box::new(chat),
    )
    .unwrap();
    Harness {
        _dir: dir,
        root,
        runtime,
    }
}

fn harness(drafts: Vec<DraftPlan>) -> Harness {
    harness_with(drafts, ChatEngine::Disabled, |_| {})
}

fn draft(ops: Vec<DraftOp>) -> DraftPlan {
    DraftPlan {
        ops,
        summary: "test draft".into(),
    }
}

fn owner() -> RequestedBy {
    RequestedBy {
        user_id: OWNER,
        channel_id: CHAT,
    }
}

fn event_types(h: &Harness, plan_id: &str) -> Vec<AuditEventType> {
    h.runtime
        .audit()
        .read_events(plan_id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

fn lines(n: usize) -> String {
    (0..n).map(|i| format!("line {}\n", i)).collect()
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

// ── creation ─────────────────────────────────────────────────────

#[test]
fn low_risk_read_plan_is_pending() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);

    let created = h.runtime.create_plan(owner(), "read the a doc").unwrap();
    let plan = &created.plan;
    assert_eq!(plan.status, PlanStatus::PendingApproval);
    assert_eq!(plan.risk.level, RiskLevel::Low);
    assert!(plan.risk.score < 30);
    assert!(!plan.risk.blocked);
    assert_eq!(created.summary, "test draft");
    assert!(!plan.policy_snapshot.network_ops);
    assert!(!plan.policy_snapshot.shell_exec);
    assert_eq!(plan.policy_snapshot.policy_id, "pol_test");

    assert_eq!(
        h.runtime.get_status(OWNER, &plan.plan_id).unwrap(),
        PlanStatus::PendingApproval
    );
    assert_eq!(event_types(&h, &plan.plan_id), vec![AuditEventType::PlanCreated]);
    let first = &h.runtime.audit().read_events(&plan.plan_id).unwrap()[0];
    assert_eq!(first.prev_hash, GENESIS);
    assert!(h.runtime.config().plans_dir.join(format!("{}.json", plan.plan_id)).exists());
}

#[test]
fn traversal_in_draft_is_refused_before_persisting() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/../secrets.txt")])]);
    let err = h.runtime.create_plan(owner(), "sneak").unwrap_err();
    assert!(matches!(err, RuntimeError::Policy(PolicyViolation::InvalidDraft(_))));
    assert!(h.runtime.list_recent_plans(OWNER, 20).unwrap().is_empty());
}

#[test]
fn path_outside_prefixes_is_refused() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "src/main.rs")])]);
    let err = h.runtime.create_plan(owner(), "read code").unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Policy(PolicyViolation::Path(PathGuardViolation::OutsidePrefixes { .. }))
    ));
}

#[test]
fn disallowed_op_type_is_refused() {
    let h = harness_with(
        vec![draft(vec![DraftOp::new("create_file", "docs/new.md").with_content("x")])],
        ChatEngine::Disabled,
        |p| p.executor.allowed_ops = vec!["list_dir".into(), "read_file".into()],
    );
    let err = h.runtime.create_plan(owner(), "write").unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Policy(PolicyViolation::OpNotAllowed { ref op_type, .. }) if op_type == "create_file"
    ));
}

#[test]
fn empty_draft_is_refused() {
    let h = harness(vec![draft(vec![])]);
    let err = h.runtime.create_plan(owner(), "nothing").unwrap_err();
    assert!(matches!(err, RuntimeError::Policy(PolicyViolation::InvalidDraft(_))));
}

#[test]
fn empty_request_never_reaches_the_planner() {
    let h = harness(vec![]);
    let err = h.runtime.create_plan(owner(), "   ").unwrap_err();
    assert!(matches!(err, RuntimeError::Policy(PolicyViolation::InvalidRequest(_))));
}

// ── gatekeeping ──────────────────────────────────────────────────

#[test]
fn user_outside_allowlist_is_refused() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let stranger = RequestedBy {
        user_id: STRANGER,
        channel_id: CHAT,
    };
    let err = h.runtime.create_plan(stranger, "read").unwrap_err();
    assert!(matches!(err, RuntimeError::Policy(PolicyViolation::UserNotAllowed(STRANGER))));
    assert!(h.runtime.get_runtime_status(STRANGER).is_err());
}

#[test]
fn plan_rate_limit_blocks_without_side_effects() {
    let h = harness_with(
        vec![
            draft(vec![DraftOp::new("read_file", "docs/a.md")]),
            draft(vec![DraftOp::new("read_file", "docs/a.md")]),
        ],
        ChatEngine::Disabled,
        |p| p.rate_limit.plan_per_minute = 1,
    );
    h.runtime.create_plan(owner(), "first").unwrap();
    let err = h.runtime.create_plan(owner(), "second").unwrap_err();
    assert!(matches!(err, RuntimeError::RateLimited(_)));
    assert_eq!(h.runtime.list_recent_plans(OWNER, 20).unwrap().len(), 1);
}

#[test]
fn other_users_cannot_touch_or_see_a_plan() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;

    for err in [
        h.runtime
            .approve_and_execute(OTHER, &plan.plan_id, &plan.short_token)
            .unwrap_err(),
        h.runtime.reject_plan(OTHER, &plan.plan_id).unwrap_err(),
        h.runtime.get_status(OTHER, &plan.plan_id).map(|_| ()).unwrap_err(),
        h.runtime.get_logs(OTHER, &plan.plan_id).map(|_| ()).unwrap_err(),
        h.runtime.export_plan_json(OTHER, &plan.plan_id).map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err, RuntimeError::Policy(PolicyViolation::PlanNotFound(_))));
    }
    // Unknown ids look exactly the same.
    let err = h.runtime.get_status(OWNER, "pln_doesnotexist").unwrap_err();
    assert_eq!(
        err.to_string(),
        "policy violation: plan not found: pln_doesnotexist"
    );
    assert_eq!(
        h.runtime.get_status(OWNER, &plan.plan_id).unwrap(),
        PlanStatus::PendingApproval
    );
}

// ── approval ─────────────────────────────────────────────────────

#[test]
fn wrong_token_leaves_plan_pending() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;

    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, "WRONGTOKEN")
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Approval(ApprovalError::TokenMismatch(_))));
    assert_eq!(
        h.runtime.get_status(OWNER, &plan.plan_id).unwrap(),
        PlanStatus::PendingApproval
    );
    assert_eq!(event_types(&h, &plan.plan_id), vec![AuditEventType::PlanCreated]);
}

#[test]
fn critical_plan_cannot_be_approved() {
    let ops = (0..3)
        .map(|i| DraftOp::new("create_file", &format!("docs/big{}.md", i)).with_content(lines(100)))
        .collect();
    let h = harness(vec![draft(ops)]);
    let plan = h.runtime.create_plan(owner(), "lots of files").unwrap().plan;
    assert_eq!(plan.risk.level, RiskLevel::Critical);
    assert!(plan.risk.blocked);

    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Approval(ApprovalError::RiskBlocked {
            level: RiskLevel::Critical,
            ..
        })
    ));
    assert!(!h.root.join("docs/big0.md").exists());
    assert_eq!(
        h.runtime.get_status(OWNER, &plan.plan_id).unwrap(),
        PlanStatus::PendingApproval
    );
}

#[test]
fn approval_is_single_use() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;

    h.runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap();
    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Approval(ApprovalError::InvalidState {
            status: PlanStatus::Executed,
            ..
        })
    ));
}

#[test]
fn rejected_plan_stays_rejected() {
    let h = harness(vec![draft(vec![DraftOp::new("create_file", "docs/new.md").with_content("hi\n")])]);
    let plan = h.runtime.create_plan(owner(), "new doc").unwrap().plan;

    assert_eq!(
        h.runtime.reject_plan(OWNER, &plan.plan_id).unwrap(),
        PlanStatus::Rejected
    );
    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Approval(ApprovalError::InvalidState { .. })));
    assert!(!h.root.join("docs/new.md").exists());
    assert_eq!(
        event_types(&h, &plan.plan_id),
        vec![AuditEventType::PlanCreated, AuditEventType::Rejected]
    );
}

#[test]
fn late_approval_records_the_expiry() {
    let h = harness(vec![draft(vec![DraftOp::new("create_file", "docs/new.md").with_content("hi\n")])]);
    let plan = h.runtime.create_plan(owner(), "new doc").unwrap().plan;
    let late = plan.expires_at + chrono::Duration::seconds(1);

    let err = h
        .runtime
        .approve_and_execute_at(OWNER, &plan.plan_id, &plan.short_token, late)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Approval(ApprovalError::Expired(_))));
    assert_eq!(h.runtime.get_status(OWNER, &plan.plan_id).unwrap(), PlanStatus::Expired);
    assert!(!h.root.join("docs/new.md").exists());

    let events = h.runtime.audit().read_events(&plan.plan_id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, AuditEventType::PlanExpired);
    assert_eq!(events[1].status, "EXPIRED");
    assert_eq!(events[1].payload["attempted_by"], OWNER);
    h.runtime.verify_audit(OWNER, &plan.plan_id).unwrap();

    // Terminal now: a retry is refused and adds nothing to the chain.
    let err = h
        .runtime
        .approve_and_execute_at(OWNER, &plan.plan_id, &plan.short_token, late)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Approval(ApprovalError::InvalidState { .. })));
    assert_eq!(h.runtime.audit().read_events(&plan.plan_id).unwrap().len(), 2);
}

// ── execution ────────────────────────────────────────────────────

#[test]
fn create_and_patch_execute_with_diff_and_chain() {
    let h = harness(vec![draft(vec![
        DraftOp::new("create_file", "docs/notes/new.md").with_content("hello\n"),
        DraftOp::new("patch_file", "docs/a.md").with_patch(encode_envelope("# A\n\nfirst\nchanged\n")),
        DraftOp::new("list_dir", "docs"),
    ])]);
    let plan = h.runtime.create_plan(owner(), "edit docs").unwrap().plan;

    let result = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap();
    assert_eq!(result.status, PlanStatus::Executed);
    assert_eq!(result.write_op_count, 2);
    assert_eq!(result.op_summaries.len(), 3);
    assert_eq!(read(&h.root, "docs/notes/new.md"), "hello\n");
    assert_eq!(read(&h.root, "docs/a.md"), "# A\n\nfirst\nchanged\n");

    let artifact = result.diff_artifact.expect("diff artifact");
    let patch = fs::read_to_string(&artifact.path).unwrap();
    assert!(patch.contains("+changed"));
    assert!(patch.contains("-second"));

    assert_eq!(
        event_types(&h, &plan.plan_id),
        vec![
            AuditEventType::PlanCreated,
            AuditEventType::Approved,
            AuditEventType::OpExecuted,
            AuditEventType::OpExecuted,
            AuditEventType::OpExecuted,
            AuditEventType::ExecutionCompleted,
        ]
    );
    let report = h.runtime.verify_audit(OWNER, &plan.plan_id).unwrap();
    assert_eq!(report.events, 6);
    assert!(report.mirror_checked);

    let logs = h.runtime.get_logs(OWNER, &plan.plan_id).unwrap();
    assert_eq!(logs.final_status, PlanStatus::Executed);
    assert_eq!(logs.diff_path, Some(artifact.path.display().to_string()));
    assert_eq!(logs.chain_head_hash, report.head);
}

#[test]
fn create_over_existing_file_fails_the_plan() {
    let h = harness(vec![draft(vec![DraftOp::new("create_file", "docs/a.md").with_content("clobber\n")])]);
    let plan = h.runtime.create_plan(owner(), "overwrite").unwrap().plan;

    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap_err();
    assert!(err.to_string().contains("target already exists"));
    assert!(matches!(
        err,
        RuntimeError::Execution(ExecutionError::OpFailed {
            source: OpFailure::TargetExists(_),
            ..
        })
    ));
    assert_eq!(h.runtime.get_status(OWNER, &plan.plan_id).unwrap(), PlanStatus::Failed);
    assert_eq!(read(&h.root, "docs/a.md"), "# A\n\nfirst\nsecond\n");

    let logs = h.runtime.get_logs(OWNER, &plan.plan_id).unwrap();
    assert_eq!(logs.final_status, PlanStatus::Failed);
    assert_eq!(logs.diff_path, None);
}

#[test]
fn partial_writes_survive_a_failed_plan() {
    let h = harness(vec![draft(vec![
        DraftOp::new("create_file", "docs/first.md").with_content("kept\n"),
        DraftOp::new("patch_file", "docs/missing.md").with_patch(encode_envelope("never\n")),
    ])]);
    let plan = h.runtime.create_plan(owner(), "two writes").unwrap().plan;

    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap_err();
    match err {
        RuntimeError::Execution(ExecutionError::OpFailed {
            ref op_id,
            completed_ops,
            write_ops,
            source: OpFailure::TargetMissing(_),
            ..
        }) => {
            assert_eq!(op_id, "op_2");
            assert_eq!(completed_ops, 1);
            assert_eq!(write_ops, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(h.runtime.get_status(OWNER, &plan.plan_id).unwrap(), PlanStatus::Failed);
    assert_eq!(read(&h.root, "docs/first.md"), "kept\n");
    assert!(!h.root.join("docs/missing.md").exists());

    let events = h.runtime.audit().read_events(&plan.plan_id).unwrap();
    let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            AuditEventType::PlanCreated,
            AuditEventType::Approved,
            AuditEventType::OpExecuted,
            AuditEventType::ExecutionFailed,
        ]
    );
    assert_eq!(events[2].payload["op_id"], "op_1");
    assert_eq!(events[3].status, "FAILED");
    for pair in events.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].event_hash);
    }

    let summary = h.runtime.store().get_audit_summary(&plan.plan_id).unwrap().unwrap();
    assert_eq!(summary.final_status, PlanStatus::Failed);
    assert_eq!(summary.write_ops, 1);
    assert_eq!(summary.chain_head_hash, events[3].event_hash);
}

#[test]
fn failure_after_all_ops_still_counts_their_writes() {
    let h = harness(vec![draft(vec![
        DraftOp::new("create_file", "docs/one.md").with_content("1\n"),
        DraftOp::new("create_file", "docs/two.md").with_content("2\n"),
    ])]);
    let plan = h.runtime.create_plan(owner(), "two creates").unwrap().plan;

    let diff_dir = &h.runtime.config().audit_diff_dir;
    fs::create_dir_all(diff_dir).unwrap();
    fs::write(diff_dir.join(format!("{}.patch", plan.plan_id)), "stale").unwrap();

    let err = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Execution(ExecutionError::Diff { .. })));
    assert_eq!(read(&h.root, "docs/one.md"), "1\n");
    assert_eq!(read(&h.root, "docs/two.md"), "2\n");

    let events = h.runtime.audit().read_events(&plan.plan_id).unwrap();
    let failed = events.last().unwrap();
    assert_eq!(failed.event_type, AuditEventType::ExecutionFailed);
    assert_eq!(failed.status, "FAILED");
    assert_eq!(failed.payload["completed_ops"], 2);
    assert_eq!(failed.payload["write_ops"], 2);

    let summary = h.runtime.store().get_audit_summary(&plan.plan_id).unwrap().unwrap();
    assert_eq!(summary.final_status, PlanStatus::Failed);
    assert_eq!(summary.write_ops, 2);
}

#[test]
fn read_only_plan_reports_metadata_not_content() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;
    let result = h
        .runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap();
    assert!(result.diff_artifact.is_none());
    assert_eq!(result.write_op_count, 0);

    let jsonl = fs::read_to_string(h.runtime.audit().jsonl_path_for(&plan.plan_id).unwrap()).unwrap();
    assert!(!jsonl.contains("first\\nsecond"));
}

// ── read paths ───────────────────────────────────────────────────

#[test]
fn status_and_logs_reads_do_not_mutate() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;

    let err = h.runtime.get_logs(OWNER, &plan.plan_id).unwrap_err();
    assert!(matches!(err, RuntimeError::SummaryNotFound(_)));

    h.runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap();
    let events_before = h.runtime.store().get_events(&plan.plan_id).unwrap();
    let first = h.runtime.get_logs(OWNER, &plan.plan_id).unwrap();
    for _ in 0..5 {
        assert_eq!(h.runtime.get_status(OWNER, &plan.plan_id).unwrap(), PlanStatus::Executed);
        assert_eq!(h.runtime.get_logs(OWNER, &plan.plan_id).unwrap(), first);
    }
    assert_eq!(h.runtime.store().get_events(&plan.plan_id).unwrap(), events_before);
}

#[test]
fn listings_show_owner_plans_with_tokens() {
    let h = harness(vec![
        draft(vec![DraftOp::new("read_file", "docs/a.md")]),
        draft(vec![DraftOp::new("list_dir", "docs")]),
    ]);
    let first = h.runtime.create_plan(owner(), "one").unwrap().plan;
    let second = h.runtime.create_plan(owner(), "two").unwrap().plan;
    h.runtime.reject_plan(OWNER, &first.plan_id).unwrap();

    let recent = h.runtime.list_recent_plans(OWNER, 20).unwrap();
    assert_eq!(recent.len(), 2);
    let pending = h.runtime.list_pending_plans(OWNER, 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].plan_id, second.plan_id);
    assert_eq!(pending[0].short_token, second.short_token);
    assert!(h.runtime.list_recent_plans(OTHER, 20).unwrap().is_empty());
}

#[test]
fn export_round_trips_through_the_plan_model() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;

    let json = h.runtime.export_plan_json(OWNER, &plan.plan_id).unwrap();
    let back = Plan::from_json(&json).unwrap();
    assert_eq!(back.plan_id, plan.plan_id);
    assert_eq!(back.ops, plan.ops);
    assert!(json.contains('\n'));
}

#[test]
fn runtime_status_reports_identity() {
    let h = harness_with(vec![], ChatEngine::Disabled, |p| p.instance.id = "bot-7".into());
    let status = h.runtime.get_runtime_status(OWNER).unwrap();
    assert_eq!(status.instance_id, "bot-7");
    assert_eq!(status.engine_mode, EngineMode::Scripted);
    assert_eq!(status.policy_id, "pol_test");
}

#[test]
fn tampered_log_fails_verification() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;
    h.runtime.reject_plan(OWNER, &plan.plan_id).unwrap();

    let path = h.runtime.audit().jsonl_path_for(&plan.plan_id).unwrap();
    let tampered = fs::read_to_string(&path)
        .unwrap()
        .replace("\"rejected_by\":101", "\"rejected_by\":202");
    fs::write(&path, tampered).unwrap();

    let err = h.runtime.verify_audit(OWNER, &plan.plan_id).unwrap_err();
    assert!(matches!(err, RuntimeError::Audit(AuditError::IntegrityViolation { .. })));
}

#[test]
fn tail_returns_the_newest_events() {
    let h = harness(vec![draft(vec![DraftOp::new("read_file", "docs/a.md")])]);
    let plan = h.runtime.create_plan(owner(), "read").unwrap().plan;
    h.runtime
        .approve_and_execute(OWNER, &plan.plan_id, &plan.short_token)
        .unwrap();

    let tail = h.runtime.tail_audit(OWNER, &plan.plan_id, 2).unwrap();
    let types: Vec<_> = tail.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![AuditEventType::OpExecuted, AuditEventType::ExecutionCompleted]);
    assert_eq!(h.runtime.tail_audit(OWNER, &plan.plan_id, 100).unwrap().len(), 4);
}

// ── chat ─────────────────────────────────────────────────────────

#[test]
fn chat_answers_are_trimmed_and_truncated() {
    let long = format!("  {}  ", "x".repeat(MAX_CHAT_ANSWER_CHARS + 50));
    let h = harness_with(vec![], ChatEngine::Scripted(long), |_| {});
    let answer = h.runtime.answer_chat(OWNER, "hello?").unwrap();
    assert_eq!(answer.chars().count(), MAX_CHAT_ANSWER_CHARS);
    assert!(answer.starts_with('x'));
}

#[test]
fn blank_chat_answer_is_an_error() {
    let h = harness_with(vec![], ChatEngine::Scripted("   \n".into()), |_| {});
    let err = h.runtime.answer_chat(OWNER, "hello?").unwrap_err();
    assert!(matches!(err, RuntimeError::Planner(CollaboratorError::EmptyAnswer)));
}
