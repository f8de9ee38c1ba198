// error.rs — Error types for diff artifact generation.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffError {
    /// Failed to create the diff directory or write the patch.
    #[error("failed to write diff artifact at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A patch for this plan already exists; artifacts are write-once.
    #[error("diff artifact already exists at {0}")]
    AlreadyExists(PathBuf),

    /// Plan ids become file names, so they must be plain identifiers.
    #[error("invalid plan id for diff artifact: '{0}'")]
    InvalidPlanId(String),
}
