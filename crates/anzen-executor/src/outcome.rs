// outcome.rs — What each executed op reports back.
//
// Summaries carry metadata only. File contents are never copied into an
// outcome, so nothing read from the workspace leaks into the audit trail
// or a chat reply.

use serde::{Deserialize, Serialize};

use anzen_plan::OpType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OpOutcome {
    Listed { entries: usize, preview: Vec<String> },
    /// A listing target that does not exist. Not an error.
    Skipped { reason: String },
    Read { bytes: u64, lines: usize },
    Created { bytes: u64, lines: usize },
    Patched { bytes_before: u64, bytes_after: u64, lines: usize },
}

impl OpOutcome {
    pub fn is_write(&self) -> bool {
        matches!(self, OpOutcome::Created { .. } | OpOutcome::Patched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSummary {
    pub op_id: String,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub path: String,
    pub outcome: OpOutcome,
}

impl OpSummary {
    /// One-line human form, e.g. `op_2 read_file docs/a.md: 120 bytes, 4 lines`.
    pub fn describe(&self) -> String {
        let detail = match &self.outcome {
            OpOutcome::Listed { entries, preview } => {
                if preview.is_empty() {
                    format!("{} entries", entries)
                } else {
                    format!("{} entries ({})", entries, preview.join(", "))
                }
            }
            OpOutcome::Skipped { reason } => format!("skipped ({})", reason),
            OpOutcome::Read { bytes, lines } => format!("{} bytes, {} lines", bytes, lines),
            OpOutcome::Created { bytes, lines } => format!("created, {} bytes, {} lines", bytes, lines),
            OpOutcome::Patched {
                bytes_before,
                bytes_after,
                lines,
            } => format!("patched, {} -> {} bytes, {} lines", bytes_before, bytes_after, lines),
        };
        format!("{} {} {}: {}", self.op_id, self.op_type, self.path, detail)
    }
}
