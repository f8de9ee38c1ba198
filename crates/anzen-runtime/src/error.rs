// error.rs — Error types for the runtime orchestrator.
//
// RuntimeError is the one taxonomy a front-end has to translate. Audit
// consistency faults are lifted out of whatever layer raised them so a
// caller can treat them as fatal without digging through sources.

use std::time::Duration;

use thiserror::Error;

use anzen_approval::ApprovalError;
use anzen_audit::AuditError;
use anzen_executor::ExecutionError;
use anzen_plan::PlanError;
use anzen_policy::{PathGuardViolation, PolicyError, RateLimitExceeded};
use anzen_store::StoreError;

/// A request was refused before anything was mutated.
#[derive(Debug, Error)]
pub enum PolicyViolation {
    #[error("user {0} is not allowed to use this bot")]
    UserNotAllowed(i64),

    /// Unknown plan, or a plan owned by someone else. The two are reported
    /// identically so callers cannot fish for other users' plan ids.
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("operation type '{op_type}' is not allowed by policy ({op_id})")]
    OpNotAllowed { op_id: String, op_type: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Path(#[from] PathGuardViolation),

    /// The drafted plan did not survive parse-then-validate.
    #[error("invalid draft: {0}")]
    InvalidDraft(#[from] PlanError),
}

/// The draft or chat collaborator could not produce an answer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("I/O error talking to '{command}': {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' did not answer within {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: String },

    #[error("unparseable answer from '{command}': {reason}")]
    Malformed { command: String, reason: String },

    #[error("empty answer")]
    EmptyAnswer,

    /// The configured engine cannot serve this kind of request.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] PolicyError),

    #[error("policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error("approval failed: {0}")]
    Approval(#[from] ApprovalError),

    #[error("execution failed: {0}")]
    Execution(ExecutionError),

    /// The audit file and its mirror disagree. Not retried.
    #[error("audit consistency fault: {0}")]
    ConsistencyFault(AuditError),

    #[error("planner error: {0}")]
    Planner(#[from] CollaboratorError),

    #[error("audit log error: {0}")]
    Audit(AuditError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("audit summary not found: {0}")]
    SummaryNotFound(String),

    #[error("failed to encode plan: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RuntimeError {
    /// True for failures that mean the audit trail can no longer be trusted.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, RuntimeError::ConsistencyFault(_))
    }
}

impl From<AuditError> for RuntimeError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::ConsistencyFault { .. } => RuntimeError::ConsistencyFault(e),
            other => RuntimeError::Audit(other),
        }
    }
}

impl From<ExecutionError> for RuntimeError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Audit {
                source: source @ AuditError::ConsistencyFault { .. },
                ..
            } => RuntimeError::ConsistencyFault(source),
            other => RuntimeError::Execution(other),
        }
    }
}

impl From<PathGuardViolation> for RuntimeError {
    fn from(e: PathGuardViolation) -> Self {
        RuntimeError::Policy(PolicyViolation::Path(e))
    }
}
