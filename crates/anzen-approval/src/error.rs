// error.rs — Error types for the approval state machine.

use thiserror::Error;

use anzen_plan::{PlanError, PlanStatus, RiskLevel};
use anzen_store::StoreError;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("plan {0} not found")]
    NotFound(String),

    /// The plan is not in the status the operation requires.
    #[error("plan {plan_id} is {status}, expected {expected}")]
    InvalidState {
        plan_id: String,
        status: PlanStatus,
        expected: PlanStatus,
    },

    /// The plan's risk level is on the block list; no token unlocks it.
    #[error("plan {plan_id} is blocked at risk level {level}")]
    RiskBlocked { plan_id: String, level: RiskLevel },

    #[error("short token mismatch for plan {0}")]
    TokenMismatch(String),

    /// The approval window has passed; the plan is now EXPIRED.
    #[error("plan {0} has expired")]
    Expired(String),

    /// The plan handed in for creation does not validate.
    #[error("invalid plan: {0}")]
    Invalid(#[from] PlanError),

    /// The stored plan no longer parses or validates.
    #[error("stored plan {plan_id} is corrupted: {reason}")]
    Corrupted { plan_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
