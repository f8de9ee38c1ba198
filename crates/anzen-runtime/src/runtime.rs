// runtime.rs — The orchestrator a chat or CLI front-end talks to.
//
// Every entry point starts the same way: allowlist, then rate bucket, then
// (for anything naming a plan) an ownership check against the stored
// requester. Only after those pass does anything reach the planner, the
// approval service or the executor. Lifecycle steps are appended to the
// plan's audit chain here; per-op events come from the executor itself.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use anzen_approval::{ApprovalError, ApprovalService};
use anzen_audit::{AuditEvent, AuditEventType, AuditLogger, AuditMirror, ChainReport};
use anzen_diff::DiffService;
use anzen_executor::{ExecutionResult, Executor};
use anzen_plan::{PlanStatus, RequestedBy};
use anzen_policy::{EngineMode, PathGuard, PolicyConfig, RateBucket, RateLimiter};
use anzen_store::{AuditSummary, PlanStore, PlanSummary};

use crate::chat::ChatAnswerClient;
use crate::config::RuntimeConfig;
use crate::draft::PlanDraftClient;
use crate::error::{CollaboratorError, PolicyViolation, RuntimeError};
use crate::planner::{CreatedPlan, PlannerService};

/// Longest chat answer handed back to a front-end, in characters.
pub const MAX_CHAT_ANSWER_CHARS: usize = 3500;

/// Default page sizes for the two listings.
pub const RECENT_PLANS_LIMIT: usize = 20;
pub const PENDING_PLANS_LIMIT: usize = 10;

/// Where to find the evidence for a finished plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsView {
    pub plan_id: String,
    pub final_status: PlanStatus,
    /// `None` when the plan wrote nothing (or never got far enough to).
    pub diff_path: Option<String>,
    pub jsonl_path: String,
    pub chain_head_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub instance_id: String,
    pub engine_mode: EngineMode,
    pub policy_id: String,
}

pub struct Runtime {
    config: RuntimeConfig,
    policy: Arc<PolicyConfig>,
    store: Arc<PlanStore>,
    audit: Arc<AuditLogger>,
    approval: Arc<ApprovalService>,
    planner: PlannerService,
    executor: Executor,
    chat: Box<dyn ChatAnswerClient>,
    limiter: RateLimiter,
}

impl Runtime {
    /// Open the store and wire every component from `config`.
    pub fn open(
        config: RuntimeConfig,
        drafts: Box<dyn PlanDraftClient>,
        chat: Box<dyn ChatAnswerClient>,
    ) -> Result<Self, RuntimeError> {
        let policy = Arc::clone(&config.policy);
        policy.validate()?;

        let store = Arc::new(PlanStore::open(&config.sqlite_path, config.plans_dir.clone())?);
        let mirror: Arc<dyn AuditMirror> = store.clone();
        let audit = Arc::new(AuditLogger::new(config.audit_jsonl_dir.clone(), Some(mirror)));
        let approval = Arc::new(ApprovalService::new(
            Arc::clone(&store),
            policy.risk.block_levels.clone(),
        ));
        let planner = PlannerService::new(
            Arc::clone(&policy),
            PathGuard::from_policy(config.workspace_root.clone(), &policy),
            Arc::clone(&approval),
            drafts,
        );
        let executor = Executor::new(
            config.workspace_root.clone(),
            Arc::clone(&policy),
            Arc::clone(&approval),
            Arc::clone(&audit),
            DiffService::new(config.audit_diff_dir.clone()),
        );

        tracing::info!(
            instance = %policy.instance.id,
            policy_id = %policy.version,
            workspace = %config.workspace_root.display(),
            "runtime ready"
        );
        Ok(Self {
            config,
            policy,
            store,
            audit,
            approval,
            planner,
            executor,
            chat,
            limiter: RateLimiter::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    // ── plan lifecycle ───────────────────────────────────────────

    /// Draft, validate, score and persist a plan for `requested_by`.
    pub fn create_plan(&self, requested_by: RequestedBy, request_text: &str) -> Result<CreatedPlan, RuntimeError> {
        self.enforce_allowlist(requested_by.user_id)?;
        self.check_rate(requested_by.user_id, RateBucket::Plan)?;

        let created = self.planner.create_plan(requested_by, request_text)?;
        let plan = &created.plan;
        self.audit.append(
            &plan.plan_id,
            AuditEventType::PlanCreated,
            plan.status.as_str(),
            serde_json::json!({
                "risk_level": plan.risk.level,
                "risk_score": plan.risk.score,
                "ops_count": plan.ops.len(),
            }),
            None,
        )?;
        Ok(created)
    }

    /// Confirm a plan with its short token, then run it.
    ///
    /// On an execution failure the plan is FAILED, an EXECUTION_FAILED event
    /// and an audit summary row are written, and the execution error is
    /// returned. Writes that landed before the failure stay on disk.
    pub fn approve_and_execute(
        &self,
        user_id: i64,
        plan_id: &str,
        short_token: &str,
    ) -> Result<ExecutionResult, RuntimeError> {
        self.approve_and_execute_at(user_id, plan_id, short_token, Utc::now())
    }

    /// `approve_and_execute` with an explicit approval clock.
    pub fn approve_and_execute_at(
        &self,
        user_id: i64,
        plan_id: &str,
        short_token: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Approve)?;
        self.enforce_owner(plan_id, user_id)?;

        let plan = match self.approval.approve_at(plan_id, short_token, now) {
            Ok(plan) => plan,
            Err(err @ ApprovalError::Expired(_)) => {
                self.audit.append(
                    plan_id,
                    AuditEventType::PlanExpired,
                    PlanStatus::Expired.as_str(),
                    serde_json::json!({ "attempted_by": user_id }),
                    None,
                )?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        self.audit.append(
            plan_id,
            AuditEventType::Approved,
            PlanStatus::Approved.as_str(),
            serde_json::json!({ "approved_by": user_id }),
            None,
        )?;
        tracing::info!(plan_id = %plan_id, user_id, "plan approved");

        let started = Instant::now();
        match self.executor.execute(&plan) {
            Ok(result) => {
                let diff_path = result
                    .diff_artifact
                    .as_ref()
                    .map(|a| a.path.display().to_string());
                self.audit.append(
                    plan_id,
                    AuditEventType::ExecutionCompleted,
                    PlanStatus::Executed.as_str(),
                    serde_json::json!({
                        "write_ops": result.write_op_count,
                        "diff_path": diff_path,
                        "duration_ms": result.duration_ms,
                    }),
                    None,
                )?;
                self.record_summary(
                    plan_id,
                    PlanStatus::Executed,
                    plan.ops.len(),
                    result.write_op_count,
                    diff_path,
                    result.duration_ms,
                )?;
                Ok(result)
            }
            Err(err) if err.is_pre_run() => Err(err.into()),
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let completed_ops = err.completed_ops();
                let write_ops = err.write_ops();
                let err = RuntimeError::from(err);
                if err.is_consistency_fault() {
                    return Err(err);
                }

                // Usually FAILED; a plan whose final transition failed keeps
                // whatever status the store holds.
                let final_status = self.approval.get_status(plan_id)?;
                self.audit.append(
                    plan_id,
                    AuditEventType::ExecutionFailed,
                    final_status.as_str(),
                    serde_json::json!({
                        "error": err.to_string(),
                        "completed_ops": completed_ops,
                        "write_ops": write_ops,
                    }),
                    None,
                )?;
                self.record_summary(
                    plan_id,
                    final_status,
                    plan.ops.len(),
                    write_ops,
                    None,
                    duration_ms,
                )?;
                Err(err)
            }
        }
    }

    pub fn reject_plan(&self, user_id: i64, plan_id: &str) -> Result<PlanStatus, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        self.enforce_owner(plan_id, user_id)?;

        self.approval.reject(plan_id)?;
        self.audit.append(
            plan_id,
            AuditEventType::Rejected,
            PlanStatus::Rejected.as_str(),
            serde_json::json!({ "rejected_by": user_id }),
            None,
        )?;
        tracing::info!(plan_id = %plan_id, user_id, "plan rejected");
        Ok(PlanStatus::Rejected)
    }

    // ── read paths ───────────────────────────────────────────────

    pub fn get_status(&self, user_id: i64, plan_id: &str) -> Result<PlanStatus, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        self.enforce_owner(plan_id, user_id)?;
        Ok(self.approval.get_status(plan_id)?)
    }

    pub fn get_logs(&self, user_id: i64, plan_id: &str) -> Result<LogsView, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        self.enforce_owner(plan_id, user_id)?;

        if let Some(row) = self.store.get_audit_summary(plan_id)? {
            return Ok(LogsView {
                plan_id: row.plan_id,
                final_status: row.final_status,
                diff_path: row.diff_path,
                jsonl_path: row.jsonl_path,
                chain_head_hash: row.chain_head_hash,
            });
        }

        // Terminal without a summary row: point at the raw chain.
        let status = self
            .store
            .get_status(plan_id)?
            .ok_or_else(|| PolicyViolation::PlanNotFound(plan_id.to_string()))?;
        if !matches!(status, PlanStatus::Executed | PlanStatus::Failed) {
            return Err(RuntimeError::SummaryNotFound(plan_id.to_string()));
        }
        let jsonl_path = self.audit.jsonl_path_for(plan_id)?;
        if !jsonl_path.exists() {
            return Err(RuntimeError::SummaryNotFound(plan_id.to_string()));
        }
        Ok(LogsView {
            plan_id: plan_id.to_string(),
            final_status: status,
            diff_path: None,
            jsonl_path: jsonl_path.display().to_string(),
            chain_head_hash: self.audit.last_hash_for(plan_id)?,
        })
    }

    pub fn get_runtime_status(&self, user_id: i64) -> Result<RuntimeStatus, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        Ok(RuntimeStatus {
            instance_id: self.policy.instance.id.clone(),
            engine_mode: self.policy.engine.mode,
            policy_id: self.policy.version.clone(),
        })
    }

    pub fn list_recent_plans(&self, user_id: i64, limit: usize) -> Result<Vec<PlanSummary>, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        Ok(self.store.list_plans_for_user(user_id, limit, None)?)
    }

    pub fn list_pending_plans(&self, user_id: i64, limit: usize) -> Result<Vec<PlanSummary>, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        Ok(self
            .store
            .list_plans_for_user(user_id, limit, Some(PlanStatus::PendingApproval))?)
    }

    /// Pretty JSON of the stored plan, re-validated on the way out.
    pub fn export_plan_json(&self, user_id: i64, plan_id: &str) -> Result<String, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        self.enforce_owner(plan_id, user_id)?;
        let plan = self.approval.get_plan(plan_id)?;
        Ok(serde_json::to_string_pretty(&plan)?)
    }

    /// Re-derive the plan's hash chain from its JSONL log and compare it
    /// with the store mirror.
    pub fn verify_audit(&self, user_id: i64, plan_id: &str) -> Result<ChainReport, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        self.enforce_owner(plan_id, user_id)?;
        Ok(self.audit.verify_chain(plan_id)?)
    }

    /// The last `count` events of a plan's chain, oldest first.
    pub fn tail_audit(&self, user_id: i64, plan_id: &str, count: usize) -> Result<Vec<AuditEvent>, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        self.enforce_owner(plan_id, user_id)?;
        let mut events = self.audit.read_events(plan_id)?;
        let skip = events.len().saturating_sub(count);
        events.drain(..skip);
        Ok(events)
    }

    // ── chat ─────────────────────────────────────────────────────

    pub fn answer_chat(&self, user_id: i64, text: &str) -> Result<String, RuntimeError> {
        self.enforce_allowlist(user_id)?;
        self.check_rate(user_id, RateBucket::Command)?;
        let answer = self.chat.answer(text)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(CollaboratorError::EmptyAnswer.into());
        }
        Ok(answer.chars().take(MAX_CHAT_ANSWER_CHARS).collect())
    }

    // ── guards ───────────────────────────────────────────────────

    fn enforce_allowlist(&self, user_id: i64) -> Result<(), RuntimeError> {
        if !self.policy.is_user_allowed(user_id) {
            tracing::warn!(user_id, "request from user outside allowlist");
            return Err(PolicyViolation::UserNotAllowed(user_id).into());
        }
        Ok(())
    }

    fn check_rate(&self, user_id: i64, bucket: RateBucket) -> Result<(), RuntimeError> {
        let limit = self.policy.rate_limit.policy_for(bucket);
        self.limiter.check(user_id, bucket, limit)?;
        Ok(())
    }

    fn enforce_owner(&self, plan_id: &str, user_id: i64) -> Result<(), RuntimeError> {
        match self.store.get_plan_owner(plan_id)? {
            Some((owner, _)) if owner == user_id => Ok(()),
            Some(_) => {
                tracing::warn!(plan_id = %plan_id, user_id, "plan access by non-owner");
                Err(PolicyViolation::PlanNotFound(plan_id.to_string()).into())
            }
            None => Err(PolicyViolation::PlanNotFound(plan_id.to_string()).into()),
        }
    }

    fn record_summary(
        &self,
        plan_id: &str,
        final_status: PlanStatus,
        ops_total: usize,
        write_ops: usize,
        diff_path: Option<String>,
        duration_ms: u64,
    ) -> Result<(), RuntimeError> {
        let summary = AuditSummary {
            plan_id: plan_id.to_string(),
            final_status,
            ops_total,
            write_ops,
            diff_path,
            jsonl_path: self.audit.jsonl_path_for(plan_id)?.display().to_string(),
            chain_head_hash: self.audit.last_hash_for(plan_id)?,
            duration_ms,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        self.store.insert_audit_summary(&summary)?;
        Ok(())
    }
}
