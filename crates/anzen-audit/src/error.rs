// error.rs — Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while appending to or verifying an audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create a plan's log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an event line.
    #[error("failed to append event: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// A log line is not valid event JSON.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Plan ids become file names, so they must be plain identifiers.
    #[error("invalid plan id for audit log: '{0}'")]
    InvalidPlanId(String),

    /// The chain is broken: a link, a recomputed hash, or the mirror
    /// disagrees with what the file says.
    #[error("integrity check failed at event {line}: expected {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },

    /// The queryable mirror rejected or failed a read.
    #[error("audit mirror error: {0}")]
    Mirror(String),

    /// The file write landed but the mirror write did not. The two sinks
    /// now disagree and nothing retries automatically.
    #[error("audit consistency fault for plan {plan_id} at event {event_id}: {reason}")]
    ConsistencyFault {
        plan_id: String,
        event_id: String,
        reason: String,
    },
}
