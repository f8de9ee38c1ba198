// event.rs — Audit event data model.
//
// One AuditEvent is one line in a plan's JSONL log. The hashed fields are
// exactly `ts, event_id, plan_id, event_type, status, payload, prev_hash`;
// `event_hash` is derived from them and stored alongside. Op metadata rides
// next to the event into the mirror but is never part of the hash.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::to_canonical_string;
use crate::hasher;

/// `prev_hash` of the first event in every plan's chain.
pub const GENESIS: &str = "GENESIS";

/// What happened to the plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    PlanCreated,
    Approved,
    Rejected,
    /// Written when a late approval finds the plan past its expiry.
    PlanExpired,
    /// One per completed op, written as the op completes.
    OpExecuted,
    ExecutionFailed,
    ExecutionCompleted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::PlanCreated => "PLAN_CREATED",
            AuditEventType::Approved => "APPROVED",
            AuditEventType::Rejected => "REJECTED",
            AuditEventType::PlanExpired => "PLAN_EXPIRED",
            AuditEventType::OpExecuted => "OP_EXECUTED",
            AuditEventType::ExecutionFailed => "EXECUTION_FAILED",
            AuditEventType::ExecutionCompleted => "EXECUTION_COMPLETED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAN_CREATED" => Ok(AuditEventType::PlanCreated),
            "APPROVED" => Ok(AuditEventType::Approved),
            "REJECTED" => Ok(AuditEventType::Rejected),
            "PLAN_EXPIRED" => Ok(AuditEventType::PlanExpired),
            "OP_EXECUTED" => Ok(AuditEventType::OpExecuted),
            "EXECUTION_FAILED" => Ok(AuditEventType::ExecutionFailed),
            "EXECUTION_COMPLETED" => Ok(AuditEventType::ExecutionCompleted),
            other => Err(format!("unknown audit event type '{}'", other)),
        }
    }
}

/// Which operation an event is about, for the store's indexed columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpMeta {
    pub op_id: String,
    pub op_type: String,
    pub target_path: String,
}

/// A single audit event, one line in the JSONL log.
///
/// `ts` is kept as the exact RFC 3339 string that was hashed, so reading a
/// line back and recomputing its hash never depends on timestamp
/// re-formatting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub ts: String,
    pub event_id: String,
    pub plan_id: String,
    pub event_type: AuditEventType,
    /// Plan status at the time of the event.
    pub status: String,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub event_hash: String,
}

impl AuditEvent {
    /// Build and seal a new event linked to `prev_hash`.
    pub fn new(
        plan_id: impl Into<String>,
        event_type: AuditEventType,
        status: impl Into<String>,
        payload: serde_json::Value,
        prev_hash: impl Into<String>,
    ) -> Self {
        let mut event = Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            event_id: format!("evt_{}", Uuid::new_v4().simple()),
            plan_id: plan_id.into(),
            event_type,
            status: status.into(),
            payload,
            prev_hash: prev_hash.into(),
            event_hash: String::new(),
        };
        event.event_hash = event.compute_hash();
        event
    }

    /// SHA-256 over the canonical encoding of every field except
    /// `event_hash` itself.
    pub fn compute_hash(&self) -> String {
        let body = serde_json::json!({
            "ts": self.ts,
            "event_id": self.event_id,
            "plan_id": self.plan_id,
            "event_type": self.event_type.as_str(),
            "status": self.status,
            "payload": self.payload,
            "prev_hash": self.prev_hash,
        });
        hasher::hash_str(&to_canonical_string(&body))
    }

    /// True when the stored hash matches the recomputed one.
    pub fn is_sealed(&self) -> bool {
        self.event_hash == self.compute_hash()
    }
}
