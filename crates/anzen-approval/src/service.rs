// service.rs — ApprovalService: guarded status transitions for plans.
//
// Check order for `approve` is fixed: existence, status, risk block, token,
// expiry. A plan that is both blocked and expired reports the block; a
// wrong token on an expired plan reports the token. Only a correct token
// can move a plan to EXPIRED.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use anzen_plan::{Plan, PlanStatus, RiskLevel};
use anzen_store::{PlanRow, PlanStore};

use crate::error::ApprovalError;

pub struct ApprovalService {
    store: Arc<PlanStore>,
    block_levels: Vec<RiskLevel>,
}

impl ApprovalService {
    pub fn new(store: Arc<PlanStore>, block_levels: Vec<RiskLevel>) -> Self {
        Self {
            store,
            block_levels,
        }
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    /// Persist a freshly built plan. It must be PENDING_APPROVAL and valid.
    pub fn create_pending_plan(&self, plan: &Plan) -> Result<(), ApprovalError> {
        if plan.status != PlanStatus::PendingApproval {
            return Err(ApprovalError::InvalidState {
                plan_id: plan.plan_id.clone(),
                status: plan.status,
                expected: PlanStatus::PendingApproval,
            });
        }
        plan.validate()?;
        self.store.insert_plan(plan)?;

        // The snapshot is for humans; the row above is what counts.
        if let Err(e) = self.store.write_plan_snapshot(plan) {
            tracing::warn!(plan_id = %plan.plan_id, error = %e, "failed to write plan snapshot");
        }
        tracing::info!(
            plan_id = %plan.plan_id,
            ops = plan.ops.len(),
            risk_level = %plan.risk.level,
            "plan pending approval"
        );
        Ok(())
    }

    pub fn approve(&self, plan_id: &str, short_token: &str) -> Result<Plan, ApprovalError> {
        self.approve_at(plan_id, short_token, Utc::now())
    }

    /// `approve` with an explicit clock.
    pub fn approve_at(
        &self,
        plan_id: &str,
        short_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Plan, ApprovalError> {
        let row = self.row(plan_id)?;
        if row.status != PlanStatus::PendingApproval {
            return Err(ApprovalError::InvalidState {
                plan_id: plan_id.to_string(),
                status: row.status,
                expected: PlanStatus::PendingApproval,
            });
        }
        if self.block_levels.contains(&row.risk_level) {
            tracing::warn!(plan_id = %plan_id, level = %row.risk_level, "approval refused: risk blocked");
            return Err(ApprovalError::RiskBlocked {
                plan_id: plan_id.to_string(),
                level: row.risk_level,
            });
        }
        if !tokens_match(&row.short_token, short_token) {
            tracing::warn!(plan_id = %plan_id, "approval refused: short token mismatch");
            return Err(ApprovalError::TokenMismatch(plan_id.to_string()));
        }

        let expires_at = DateTime::parse_from_rfc3339(&row.expires_at)
            .map_err(|e| ApprovalError::Corrupted {
                plan_id: plan_id.to_string(),
                reason: format!("expires_at: {}", e),
            })?
            .with_timezone(&Utc);
        if now > expires_at {
            // Only the caller that moves the plan to EXPIRED is told so. A
            // caller that lost the race sees whatever status won.
            let expired = self
                .store
                .transition_status(plan_id, PlanStatus::PendingApproval, PlanStatus::Expired)?;
            if !expired {
                return Err(ApprovalError::InvalidState {
                    plan_id: plan_id.to_string(),
                    status: self.row(plan_id)?.status,
                    expected: PlanStatus::PendingApproval,
                });
            }
            tracing::warn!(plan_id = %plan_id, "approval refused: plan expired");
            return Err(ApprovalError::Expired(plan_id.to_string()));
        }

        self.transition(plan_id, PlanStatus::PendingApproval, PlanStatus::Approved)?;
        self.get_plan(plan_id)
    }

    pub fn reject(&self, plan_id: &str) -> Result<(), ApprovalError> {
        let row = self.row(plan_id)?;
        if row.status != PlanStatus::PendingApproval {
            return Err(ApprovalError::InvalidState {
                plan_id: plan_id.to_string(),
                status: row.status,
                expected: PlanStatus::PendingApproval,
            });
        }
        self.transition(plan_id, PlanStatus::PendingApproval, PlanStatus::Rejected)
    }

    /// APPROVED → EXECUTED. Stamps `executed_at`.
    pub fn mark_executed(&self, plan_id: &str) -> Result<(), ApprovalError> {
        self.transition(plan_id, PlanStatus::Approved, PlanStatus::Executed)
    }

    /// APPROVED → FAILED. Stamps `executed_at` as well.
    pub fn mark_failed(&self, plan_id: &str) -> Result<(), ApprovalError> {
        self.transition(plan_id, PlanStatus::Approved, PlanStatus::Failed)
    }

    /// Load the stored plan, re-validate it, and report the row's status.
    pub fn get_plan(&self, plan_id: &str) -> Result<Plan, ApprovalError> {
        let row = self.row(plan_id)?;
        let corrupted = |reason: String| ApprovalError::Corrupted {
            plan_id: plan_id.to_string(),
            reason,
        };

        let mut plan = Plan::from_json(&row.plan_json).map_err(|e| corrupted(e.to_string()))?;
        if plan.plan_id != row.plan_id {
            return Err(corrupted(format!("plan_json carries id {}", plan.plan_id)));
        }
        if plan.short_token != row.short_token {
            return Err(corrupted("plan_json token differs from row".to_string()));
        }
        plan.status = row.status;
        Ok(plan)
    }

    pub fn get_status(&self, plan_id: &str) -> Result<PlanStatus, ApprovalError> {
        self.store
            .get_status(plan_id)?
            .ok_or_else(|| ApprovalError::NotFound(plan_id.to_string()))
    }

    fn row(&self, plan_id: &str) -> Result<PlanRow, ApprovalError> {
        self.store
            .get_plan_row(plan_id)?
            .ok_or_else(|| ApprovalError::NotFound(plan_id.to_string()))
    }

    fn transition(&self, plan_id: &str, from: PlanStatus, to: PlanStatus) -> Result<(), ApprovalError> {
        if self.store.transition_status(plan_id, from, to)? {
            return Ok(());
        }
        // Zero rows: either the plan vanished or someone else moved it.
        let status = self.get_status(plan_id)?;
        Err(ApprovalError::InvalidState {
            plan_id: plan_id.to_string(),
            status,
            expected: from,
        })
    }
}

/// Compare without returning at the first differing byte.
fn tokens_match(expected: &str, given: &str) -> bool {
    let a = expected.as_bytes();
    let b = given.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use anzen_plan::{OpType, PlanOp, PolicySnapshot, RequestedBy, RiskReport};
    use chrono::Duration;
    use tempfile::tempdir;

    fn plan_at(level: RiskLevel, score: u32) -> Plan {
        Plan::new_pending(
            RequestedBy { user_id: 1, channel_id: 1 },
            "read docs/a.md",
            PolicySnapshot::new("pol_v1", vec!["docs/".into()]),
            vec![PlanOp {
                op_id: "op_1".into(),
                op_type: OpType::ReadFile,
                path: "docs/a.md".into(),
                content: None,
                patch: None,
            }],
            RiskReport {
                score,
                level,
                reasons: vec![],
                blocked: false,
            },
            Duration::minutes(10),
            8,
        )
        .unwrap()
    }

    fn service() -> (tempfile::TempDir, ApprovalService) {
        let dir = tempdir().unwrap();
        let store = PlanStore::open(dir.path().join("anzen.sqlite3"), dir.path().join("plans")).unwrap();
        let service = ApprovalService::new(Arc::new(store), vec![RiskLevel::High, RiskLevel::Critical]);
        (dir, service)
    }

    #[test]
    fn create_writes_row_and_snapshot() {
        let (dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::PendingApproval);
        assert!(dir.path().join("plans").join(format!("{}.json", plan.plan_id)).exists());
    }

    #[test]
    fn create_requires_pending_status() {
        let (_dir, service) = service();
        let mut plan = plan_at(RiskLevel::Low, 2);
        plan.status = PlanStatus::Approved;
        assert!(matches!(
            service.create_pending_plan(&plan),
            Err(ApprovalError::InvalidState { .. })
        ));
    }

    #[test]
    fn approve_happy_path_stamps_and_returns_plan() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();

        let approved = service.approve(&plan.plan_id, &plan.short_token).unwrap();
        assert_eq!(approved.status, PlanStatus::Approved);
        let row = service.store().get_plan_row(&plan.plan_id).unwrap().unwrap();
        assert!(row.approved_at.is_some());
    }

    #[test]
    fn approving_twice_fails() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();
        service.approve(&plan.plan_id, &plan.short_token).unwrap();

        match service.approve(&plan.plan_id, &plan.short_token) {
            Err(ApprovalError::InvalidState { status, .. }) => assert_eq!(status, PlanStatus::Approved),
            other => panic!("expected InvalidState, got {:?}", other),
        }
    }

    #[test]
    fn wrong_token_leaves_plan_pending() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();

        let err = service.approve(&plan.plan_id, "WRONGTOK").unwrap_err();
        assert!(matches!(err, ApprovalError::TokenMismatch(_)));
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::PendingApproval);
    }

    #[test]
    fn critical_plan_never_approves() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Critical, 90);
        service.create_pending_plan(&plan).unwrap();

        let err = service.approve(&plan.plan_id, &plan.short_token).unwrap_err();
        assert!(matches!(err, ApprovalError::RiskBlocked { level: RiskLevel::Critical, .. }));
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::PendingApproval);
    }

    #[test]
    fn late_approval_expires_the_plan() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();

        let later = plan.expires_at + Duration::seconds(1);
        let err = service.approve_at(&plan.plan_id, &plan.short_token, later).unwrap_err();
        assert!(matches!(err, ApprovalError::Expired(_)));
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::Expired);

        // Terminal: nothing moves it again.
        assert!(service.reject(&plan.plan_id).is_err());
    }

    #[test]
    fn wrong_token_on_expired_plan_does_not_expire_it() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();

        let later = plan.expires_at + Duration::minutes(5);
        let err = service.approve_at(&plan.plan_id, "nottheone", later).unwrap_err();
        assert!(matches!(err, ApprovalError::TokenMismatch(_)));
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::PendingApproval);
    }

    #[test]
    fn reject_then_nothing() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();
        service.reject(&plan.plan_id).unwrap();
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::Rejected);
        assert!(service.approve(&plan.plan_id, &plan.short_token).is_err());
        assert!(service.reject(&plan.plan_id).is_err());
    }

    #[test]
    fn execution_marks_require_approved() {
        let (_dir, service) = service();
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();
        assert!(service.mark_executed(&plan.plan_id).is_err());

        service.approve(&plan.plan_id, &plan.short_token).unwrap();
        service.mark_failed(&plan.plan_id).unwrap();
        assert_eq!(service.get_status(&plan.plan_id).unwrap(), PlanStatus::Failed);
        let row = service.store().get_plan_row(&plan.plan_id).unwrap().unwrap();
        assert!(row.executed_at.is_some());
        assert!(service.mark_executed(&plan.plan_id).is_err());
    }

    #[test]
    fn unknown_plan_is_not_found() {
        let (_dir, service) = service();
        assert!(matches!(service.approve("pln_nope123", "abcdefgh"), Err(ApprovalError::NotFound(_))));
        assert!(matches!(service.get_plan("pln_nope123"), Err(ApprovalError::NotFound(_))));
    }

    #[test]
    fn racing_approvals_have_one_winner() {
        let (_dir, service) = service();
        let service = Arc::new(service);
        let plan = plan_at(RiskLevel::Low, 2);
        service.create_pending_plan(&plan).unwrap();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let service = service.clone();
                let (id, token) = (plan.plan_id.clone(), plan.short_token.clone());
                std::thread::spawn(move || service.approve(&id, &token).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn tokens_compare_exactly() {
        assert!(tokens_match("abcDEF12", "abcDEF12"));
        assert!(!tokens_match("abcDEF12", "abcdef12"));
        assert!(!tokens_match("abcDEF12", "abcDEF1"));
        assert!(!tokens_match("abcDEF12", ""));
    }
}
