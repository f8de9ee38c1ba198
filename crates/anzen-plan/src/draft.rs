// draft.rs — Untrusted plan drafts from the planning collaborator.
//
// A draft is whatever the LLM side produced: loosely typed strings. Nothing
// in it is trusted. `DraftPlan::into_ops` parses it into `PlanOp`s, assigns
// op ids in draft order, and runs every op guard before anything else sees
// the result.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::model::{validate_op_path, OpType, PlanOp, MAX_OPS};

/// One operation as the planner proposed it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftOp {
    #[serde(rename = "type", default)]
    pub op_type: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

impl DraftOp {
    pub fn new(op_type: &str, path: &str) -> Self {
        Self {
            op_type: op_type.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }
}

/// The planner's answer: ordered ops plus a free-text summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftPlan {
    #[serde(default)]
    pub ops: Vec<DraftOp>,
    #[serde(default)]
    pub summary: String,
}

impl DraftPlan {
    pub fn from_json(raw: &str) -> Result<Self, PlanError> {
        serde_json::from_str(raw).map_err(|e| PlanError::plan("draft", e.to_string()))
    }

    /// Parse and validate every op. Op ids are `op_1`, `op_2`, ... in
    /// draft order.
    pub fn into_ops(self) -> Result<Vec<PlanOp>, PlanError> {
        if self.ops.is_empty() {
            return Err(PlanError::plan("ops", "draft contains no operations"));
        }
        if self.ops.len() > MAX_OPS {
            return Err(PlanError::plan(
                "ops",
                format!("draft has {} operations, limit is {}", self.ops.len(), MAX_OPS),
            ));
        }

        let mut ops = Vec::with_capacity(self.ops.len());
        for (index, draft) in self.ops.into_iter().enumerate() {
            let op_id = format!("op_{}", index + 1);
            let op_type: OpType = draft
                .op_type
                .trim()
                .parse()
                .map_err(|reason: String| PlanError::op(&op_id, reason))?;
            let path = validate_op_path(&pre_normalize(&draft.path))
                .map_err(|reason| PlanError::op(&op_id, reason))?;

            let op = PlanOp {
                op_id,
                op_type,
                path,
                content: draft.content,
                patch: draft.patch,
            };
            op.validate()?;
            ops.push(op);
        }
        Ok(ops)
    }
}

/// Forgive cosmetic path noise planners tend to emit: backslashes,
/// doubled separators, a trailing slash. Anything structurally wrong is
/// left for validation to reject.
fn pre_normalize(raw: &str) -> String {
    let path = raw.trim().replace('\\', "/");
    // A leading "//" is a UNC form and must survive to be rejected.
    let (lead, rest) = match path.strip_prefix("//") {
        Some(rest) => ("//", rest),
        None => ("", path.as_str()),
    };
    let mut collapsed = rest.to_string();
    while collapsed.contains("//") {
        collapsed = collapsed.replace("//", "/");
    }
    while collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    format!("{}{}", lead, collapsed)
}
