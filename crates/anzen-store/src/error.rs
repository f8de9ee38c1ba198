// error.rs — Error types for the durable store.

use std::path::PathBuf;
use thiserror::Error;

use anzen_plan::PlanStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A plan with this id is already stored.
    #[error("plan {0} already exists")]
    Duplicate(String),

    /// The requested edge is not in the status graph.
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: PlanStatus, to: PlanStatus },

    /// A stored value does not parse back into its type.
    #[error("stored plan {plan_id} is corrupted: {reason}")]
    Corrupted { plan_id: String, reason: String },
}
