// planner.rs — From request text to a persisted PENDING_APPROVAL plan.
//
// The draft collaborator is asked once. Its answer is parsed into ops,
// every op type is checked against the policy, every path goes through the
// path guard against the live workspace, the risk engine scores the batch,
// and the result is handed to the approval service to persist.

use std::sync::Arc;

use anzen_approval::ApprovalService;
use anzen_plan::{Plan, PolicySnapshot, RequestedBy, RiskEngine, MAX_REQUEST_CHARS};
use anzen_policy::{PathGuard, PolicyConfig};

use crate::draft::{DraftRequest, PlanDraftClient};
use crate::error::{PolicyViolation, RuntimeError};

/// A freshly persisted plan and the drafting side's own summary of it.
#[derive(Debug, Clone)]
pub struct CreatedPlan {
    pub plan: Plan,
    pub summary: String,
}

pub struct PlannerService {
    policy: Arc<PolicyConfig>,
    guard: PathGuard,
    risk: RiskEngine,
    approval: Arc<ApprovalService>,
    drafts: Box<dyn PlanDraftClient>,
}

impl PlannerService {
    pub fn new(
        policy: Arc<PolicyConfig>,
        guard: PathGuard,
        approval: Arc<ApprovalService>,
        drafts: Box<dyn PlanDraftClient>,
    ) -> Self {
        let risk = RiskEngine::from_policy(&policy);
        Self {
            policy,
            guard,
            risk,
            approval,
            drafts,
        }
    }

    pub fn create_plan(&self, requested_by: RequestedBy, request_text: &str) -> Result<CreatedPlan, RuntimeError> {
        let chars = request_text.chars().count();
        if request_text.trim().is_empty() || chars > MAX_REQUEST_CHARS {
            return Err(PolicyViolation::InvalidRequest(format!(
                "request text must be 1..={} characters, got {}",
                MAX_REQUEST_CHARS, chars
            ))
            .into());
        }

        let request = DraftRequest {
            request_text: request_text.to_string(),
            allowed_ops: self.policy.executor.allowed_ops.clone(),
            allowed_prefixes: self.policy.allowed_path_prefixes.clone(),
        };
        let mut draft = self.drafts.draft_plan(&request)?;
        let summary = std::mem::take(&mut draft.summary);
        let ops = draft.into_ops().map_err(PolicyViolation::InvalidDraft)?;

        for op in &ops {
            if !self.policy.is_op_allowed(op.op_type.as_str()) {
                return Err(PolicyViolation::OpNotAllowed {
                    op_id: op.op_id.clone(),
                    op_type: op.op_type.as_str().to_string(),
                }
                .into());
            }
            self.guard.enforce(&op.path)?;
        }

        let risk = self.risk.evaluate(&ops);
        let snapshot = PolicySnapshot::new(
            self.policy.version.clone(),
            self.policy.allowed_path_prefixes.clone(),
        );
        let plan = Plan::new_pending(
            requested_by,
            request_text,
            snapshot,
            ops,
            risk,
            chrono::Duration::minutes(i64::from(self.policy.plan.ttl_minutes)),
            self.policy.plan.short_token.length,
        )
        .map_err(PolicyViolation::InvalidDraft)?;

        self.approval.create_pending_plan(&plan)?;
        Ok(CreatedPlan { plan, summary })
    }
}
