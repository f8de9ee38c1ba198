// model.rs — Plan, PlanOp, and the status lifecycle.
//
// A Plan is the immutable contract a human approves. Everything about it is
// fixed at creation except `status`, which only the approval state machine
// moves, along this graph:
//
//   PendingApproval → Approved → Executed
//                   ↘ Rejected  ↘ Failed
//                   ↘ Expired
//
// Rejected, Expired, Executed and Failed are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use anzen_policy::{normalize_rel, RiskLevel};

use crate::error::PlanError;
use crate::ids;

/// Upper bound on operations per plan.
pub const MAX_OPS: usize = 200;

/// Upper bound on request text, in characters.
pub const MAX_REQUEST_CHARS: usize = 4000;

const MAX_POLICY_ID_CHARS: usize = 64;

// Characters that only show up in globs or template placeholders.
const FORBIDDEN_PATH_CHARS: &[char] = &['<', '>', '*', '?', '|', '"', ':'];

const PLAN_ID_PATTERN: &str = r"^pln_[A-Za-z0-9_-]{6,64}$";
const OP_ID_PATTERN: &str = r"^op_[A-Za-z0-9_-]{1,32}$";
const SHORT_TOKEN_PATTERN: &str = r"^[A-Za-z0-9]{6,12}$";

// Fail closed: a pattern that does not compile matches nothing.
fn shape_ok(pattern: &str, value: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false)
}

/// Lifecycle status of a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    PendingApproval,
    Approved,
    Rejected,
    Executed,
    Failed,
    Expired,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::PendingApproval => "PENDING_APPROVAL",
            PlanStatus::Approved => "APPROVED",
            PlanStatus::Rejected => "REJECTED",
            PlanStatus::Executed => "EXECUTED",
            PlanStatus::Failed => "FAILED",
            PlanStatus::Expired => "EXPIRED",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Rejected | PlanStatus::Expired | PlanStatus::Executed | PlanStatus::Failed
        )
    }

    /// Check whether moving from this status to `next` is a valid edge.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (PlanStatus::PendingApproval, PlanStatus::Approved)
                | (PlanStatus::PendingApproval, PlanStatus::Rejected)
                | (PlanStatus::PendingApproval, PlanStatus::Expired)
                | (PlanStatus::Approved, PlanStatus::Executed)
                | (PlanStatus::Approved, PlanStatus::Failed)
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_APPROVAL" => Ok(PlanStatus::PendingApproval),
            "APPROVED" => Ok(PlanStatus::Approved),
            "REJECTED" => Ok(PlanStatus::Rejected),
            "EXECUTED" => Ok(PlanStatus::Executed),
            "FAILED" => Ok(PlanStatus::Failed),
            "EXPIRED" => Ok(PlanStatus::Expired),
            other => Err(format!("unknown plan status '{}'", other)),
        }
    }
}

/// The four filesystem actions a plan may contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    ListDir,
    ReadFile,
    CreateFile,
    PatchFile,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::ListDir => "list_dir",
            OpType::ReadFile => "read_file",
            OpType::CreateFile => "create_file",
            OpType::PatchFile => "patch_file",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, OpType::CreateFile | OpType::PatchFile)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list_dir" => Ok(OpType::ListDir),
            "read_file" => Ok(OpType::ReadFile),
            "create_file" => Ok(OpType::CreateFile),
            "patch_file" => Ok(OpType::PatchFile),
            other => Err(format!("unsupported op type '{}'", other)),
        }
    }
}

/// Who asked for the plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestedBy {
    pub user_id: i64,
    pub channel_id: i64,
}

/// The slice of policy that was in force when the plan was created.
///
/// `network_ops` and `shell_exec` can never be true: the system has no
/// such capabilities, and every plan record says so explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PolicySnapshot {
    pub policy_id: String,
    pub allowed_path_prefixes: Vec<String>,
    #[serde(default)]
    pub network_ops: bool,
    #[serde(default)]
    pub shell_exec: bool,
}

impl PolicySnapshot {
    pub fn new(policy_id: impl Into<String>, allowed_path_prefixes: Vec<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            allowed_path_prefixes,
            network_ops: false,
            shell_exec: false,
        }
    }
}

/// Risk assessment embedded in every plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RiskReport {
    /// 0..=100, saturating.
    pub score: u32,
    pub level: RiskLevel,
    /// In evaluation order.
    pub reasons: Vec<String>,
    pub blocked: bool,
}

/// One atomic filesystem action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlanOp {
    pub op_id: String,
    #[serde(rename = "type")]
    pub op_type: OpType,
    /// Normalized workspace-relative path.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

impl PlanOp {
    /// Validate id, path shape and payload exclusivity, in that order.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !shape_ok(OP_ID_PATTERN, &self.op_id) {
            return Err(PlanError::op(&self.op_id, "op_id must match op_[A-Za-z0-9_-]{1,32}"));
        }

        let normalized = validate_op_path(&self.path).map_err(|reason| PlanError::op(&self.op_id, reason))?;
        if normalized != self.path {
            return Err(PlanError::op(
                &self.op_id,
                format!("path '{}' is not normalized (expected '{}')", self.path, normalized),
            ));
        }
        if self.path == "." && self.op_type != OpType::ListDir {
            return Err(PlanError::op(&self.op_id, "'.' is only valid for list_dir"));
        }

        match self.op_type {
            OpType::ListDir | OpType::ReadFile => {
                if self.content.is_some() || self.patch.is_some() {
                    return Err(PlanError::op(
                        &self.op_id,
                        format!("{} must not carry content or patch", self.op_type),
                    ));
                }
            }
            OpType::CreateFile => {
                if self.patch.is_some() {
                    return Err(PlanError::op(&self.op_id, "create_file must not carry a patch"));
                }
                match &self.content {
                    Some(c) if !c.is_empty() => {}
                    _ => return Err(PlanError::op(&self.op_id, "create_file requires non-empty content")),
                }
            }
            OpType::PatchFile => {
                if self.content.is_some() {
                    return Err(PlanError::op(&self.op_id, "patch_file must not carry content"));
                }
                match &self.patch {
                    Some(p) if !p.is_empty() => {}
                    _ => return Err(PlanError::op(&self.op_id, "patch_file requires a patch")),
                }
            }
        }
        Ok(())
    }
}

/// Check the shape of an op path and return its normalized form.
///
/// Accepts everything the path guard's lexical pass accepts, minus glob and
/// placeholder characters. Any path accepted here is therefore accepted by
/// the guard's normalization too.
pub fn validate_op_path(raw: &str) -> Result<String, String> {
    let normalized = normalize_rel(raw).map_err(|e| e.to_string())?;
    if let Some(c) = normalized.chars().find(|c| FORBIDDEN_PATH_CHARS.contains(c)) {
        return Err(format!("path '{}' contains forbidden character '{}'", normalized, c));
    }
    Ok(normalized)
}

/// A proposed change set awaiting (or past) human approval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub plan_id: String,
    pub short_token: String,
    pub status: PlanStatus,
    pub requested_by: RequestedBy,
    pub request_text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub policy_snapshot: PolicySnapshot,
    pub ops: Vec<PlanOp>,
    pub risk: RiskReport,
}

impl Plan {
    /// Build a fresh PENDING_APPROVAL plan with new identifiers, then
    /// validate it.
    pub fn new_pending(
        requested_by: RequestedBy,
        request_text: impl Into<String>,
        policy_snapshot: PolicySnapshot,
        ops: Vec<PlanOp>,
        risk: RiskReport,
        ttl: Duration,
        token_len: usize,
    ) -> Result<Self, PlanError> {
        let created_at = Utc::now();
        let plan = Plan {
            plan_id: ids::generate_plan_id(created_at),
            short_token: ids::generate_short_token(token_len)?,
            status: PlanStatus::PendingApproval,
            requested_by,
            request_text: request_text.into(),
            created_at,
            expires_at: created_at + ttl,
            policy_snapshot,
            ops,
            risk,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Parse a stored JSON plan and validate it.
    pub fn from_json(raw: &str) -> Result<Self, PlanError> {
        let plan: Plan =
            serde_json::from_str(raw).map_err(|e| PlanError::plan("plan_json", e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Run every plan-level guard, then every op guard, in a fixed order so
    /// the first failure is always the same one.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !shape_ok(PLAN_ID_PATTERN, &self.plan_id) {
            return Err(PlanError::plan("plan_id", "must match pln_[A-Za-z0-9_-]{6,64}"));
        }
        if !shape_ok(SHORT_TOKEN_PATTERN, &self.short_token) {
            return Err(PlanError::plan("short_token", "must be 6..=12 base62 characters"));
        }
        if self.requested_by.user_id < 1 {
            return Err(PlanError::plan("requested_by.user_id", "must be >= 1"));
        }
        if self.requested_by.channel_id < 1 {
            return Err(PlanError::plan("requested_by.channel_id", "must be >= 1"));
        }

        let text_len = self.request_text.chars().count();
        if text_len == 0 || text_len > MAX_REQUEST_CHARS {
            return Err(PlanError::plan(
                "request_text",
                format!("length must be 1..={}, got {}", MAX_REQUEST_CHARS, text_len),
            ));
        }
        if self.expires_at <= self.created_at {
            return Err(PlanError::plan("expires_at", "must be later than created_at"));
        }

        let snapshot = &self.policy_snapshot;
        let id_len = snapshot.policy_id.chars().count();
        if id_len == 0 || id_len > MAX_POLICY_ID_CHARS {
            return Err(PlanError::plan("policy_snapshot.policy_id", "length must be 1..=64"));
        }
        if snapshot.allowed_path_prefixes.is_empty() {
            return Err(PlanError::plan(
                "policy_snapshot.allowed_path_prefixes",
                "must not be empty",
            ));
        }
        if snapshot.network_ops {
            return Err(PlanError::plan("policy_snapshot.network_ops", "must be false"));
        }
        if snapshot.shell_exec {
            return Err(PlanError::plan("policy_snapshot.shell_exec", "must be false"));
        }

        if self.ops.is_empty() || self.ops.len() > MAX_OPS {
            return Err(PlanError::plan(
                "ops",
                format!("must contain 1..={} operations, got {}", MAX_OPS, self.ops.len()),
            ));
        }
        for op in &self.ops {
            op.validate()?;
        }

        if self.risk.score > 100 {
            return Err(PlanError::plan("risk.score", "must be within 0..=100"));
        }
        Ok(())
    }

    /// True once `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn write_op_count(&self) -> usize {
        self.ops.iter().filter(|op| op.op_type.is_write()).count()
    }
}
