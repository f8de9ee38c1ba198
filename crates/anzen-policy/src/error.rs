// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating the policy file.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy file does not exist or could not be read.
    #[error("policy file not readable at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy file is not valid YAML or does not match the expected shape.
    #[error("policy file is malformed: {0}")]
    Malformed(#[from] serde_yaml::Error),

    /// The policy parsed but a field failed validation.
    #[error("invalid policy value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl PolicyError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        PolicyError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A path failed the path guard.
///
/// Every variant names the offending input so callers can report
/// something actionable back to the requester.
#[derive(Debug, Error)]
pub enum PathGuardViolation {
    #[error("empty path is not allowed")]
    Empty,

    #[error("absolute path is not allowed: '{path}'")]
    Absolute { path: String },

    #[error("UNC path is not allowed: '{path}'")]
    Unc { path: String },

    #[error("drive-letter path is not allowed: '{path}'")]
    DriveLetter { path: String },

    #[error("parent traversal is not allowed: '{path}'")]
    ParentTraversal { path: String },

    #[error("invalid path segment in '{path}'")]
    InvalidSegment { path: String },

    #[error("path is outside allowed prefixes: '{path}'")]
    OutsidePrefixes { path: String },

    #[error("path '{path}' matches blocked pattern '{pattern}'")]
    BlockedPattern { path: String, pattern: String },

    #[error("symlink segment is blocked: '{segment}' in '{path}'")]
    LinkedSegment { path: String, segment: String },

    #[error("junction/reparse segment is blocked: '{segment}' in '{path}'")]
    ReparsePoint { path: String, segment: String },

    #[error("path escapes workspace: '{path}'")]
    EscapesWorkspace { path: String },

    /// The workspace root itself could not be resolved.
    #[error("workspace root unavailable at {root}: {source}")]
    WorkspaceUnavailable {
        root: PathBuf,
        source: std::io::Error,
    },
}

/// A caller exceeded the per-minute cap for a bucket. No state was mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rate limit exceeded for user={user_id}, bucket={bucket}")]
pub struct RateLimitExceeded {
    pub user_id: i64,
    pub bucket: String,
}
