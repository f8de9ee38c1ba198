// error.rs — Error types for plan construction and validation.

use thiserror::Error;

/// A plan or one of its operations failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A plan-level field is out of shape.
    #[error("invalid plan field '{field}': {reason}")]
    InvalidPlan { field: String, reason: String },

    /// An operation is out of shape. `op_id` is the assigned id, or the
    /// 1-based draft position when the id itself is the problem.
    #[error("invalid operation {op_id}: {reason}")]
    InvalidOp { op_id: String, reason: String },

    /// Token generation was asked for an unsafe length.
    #[error("short token length must be between 6 and 12, got {0}")]
    TokenLength(usize),
}

impl PlanError {
    pub(crate) fn plan(field: &str, reason: impl Into<String>) -> Self {
        PlanError::InvalidPlan {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn op(op_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::InvalidOp {
            op_id: op_id.into(),
            reason: reason.into(),
        }
    }
}
