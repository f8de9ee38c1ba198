// error.rs — Error types for plan execution.

use std::path::PathBuf;
use thiserror::Error;

use anzen_approval::ApprovalError;
use anzen_audit::AuditError;
use anzen_diff::DiffError;
use anzen_plan::PlanStatus;
use anzen_policy::PathGuardViolation;

/// Why a single op could not be applied.
#[derive(Debug, Error)]
pub enum OpFailure {
    /// The path guard refused the path at execution time.
    #[error(transparent)]
    PathGuard(#[from] PathGuardViolation),

    /// Policy no longer allows this op type.
    #[error("operation type '{0}' is not allowed by policy")]
    OpNotAllowed(String),

    #[error("target does not exist: {0}")]
    TargetMissing(String),

    #[error("target already exists: {0}")]
    TargetExists(String),

    #[error("target is not a directory: {0}")]
    NotADirectory(String),

    #[error("target is not a regular file: {0}")]
    NotAFile(String),

    /// `patch_file` payload without the replacement envelope markers.
    #[error("malformed patch envelope for {0}")]
    MalformedPatch(String),

    /// The op is missing the payload its type requires.
    #[error("operation is missing its {field} payload")]
    MissingPayload { field: &'static str },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Execution was attempted on a plan that is not APPROVED. Nothing was
    /// touched and the status is unchanged.
    #[error("plan {plan_id} is {status}, not APPROVED")]
    NotApproved { plan_id: String, status: PlanStatus },

    /// An op failed. `completed_ops` ran before it and stay applied.
    #[error("plan {plan_id} failed at {op_id}: {source}")]
    OpFailed {
        plan_id: String,
        op_id: String,
        completed_ops: usize,
        write_ops: usize,
        #[source]
        source: OpFailure,
    },

    /// Writing the diff artifact failed after every op succeeded. All ops
    /// are applied.
    #[error("diff artifact failed for plan {plan_id}: {source}")]
    Diff {
        plan_id: String,
        completed_ops: usize,
        write_ops: usize,
        #[source]
        source: DiffError,
    },

    /// Appending an op event to the audit chain failed. The op it was
    /// recording is applied and counted.
    #[error("audit append failed for plan {plan_id}: {source}")]
    Audit {
        plan_id: String,
        completed_ops: usize,
        write_ops: usize,
        #[source]
        source: AuditError,
    },

    /// Every op ran but the plan could not be moved to EXECUTED.
    #[error("plan {plan_id} ran but could not be finalized: {source}")]
    Finalize {
        plan_id: String,
        completed_ops: usize,
        write_ops: usize,
        #[source]
        source: ApprovalError,
    },

    /// Reading the plan's status before running failed. Nothing was touched.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
}

impl ExecutionError {
    /// Ops that were applied before the failure.
    pub fn completed_ops(&self) -> usize {
        match self {
            ExecutionError::OpFailed { completed_ops, .. }
            | ExecutionError::Diff { completed_ops, .. }
            | ExecutionError::Audit { completed_ops, .. }
            | ExecutionError::Finalize { completed_ops, .. } => *completed_ops,
            ExecutionError::NotApproved { .. } | ExecutionError::Approval(_) => 0,
        }
    }

    /// Write ops among them.
    pub fn write_ops(&self) -> usize {
        match self {
            ExecutionError::OpFailed { write_ops, .. }
            | ExecutionError::Diff { write_ops, .. }
            | ExecutionError::Audit { write_ops, .. }
            | ExecutionError::Finalize { write_ops, .. } => *write_ops,
            ExecutionError::NotApproved { .. } | ExecutionError::Approval(_) => 0,
        }
    }

    /// Failed before any op ran; the plan's status is untouched.
    pub fn is_pre_run(&self) -> bool {
        matches!(self, ExecutionError::NotApproved { .. } | ExecutionError::Approval(_))
    }
}
