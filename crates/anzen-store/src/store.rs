// store.rs — PlanStore: the SQLite-backed source of truth for plan state.
//
// One connection behind a mutex, shared by the approval service, the audit
// mirror and the runtime's read paths. Every status change goes through
// `transition_status`, which only updates a row still in the expected
// status; an update touching zero rows means another actor got there first.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use anzen_audit::{AuditError, AuditEvent, AuditMirror, MirroredHash, OpMeta};
use anzen_plan::{Plan, PlanStatus, RiskLevel};

use crate::error::StoreError;
use crate::schema;

/// Largest page `list_plans_for_user` will return.
pub const MAX_LIST_LIMIT: usize = 50;

/// One row of the `plans` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRow {
    pub plan_id: String,
    pub short_token: String,
    pub status: PlanStatus,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub requested_by_user_id: i64,
    pub chat_id: i64,
    pub request_text: String,
    pub created_at: String,
    pub expires_at: String,
    pub approved_at: Option<String>,
    pub rejected_at: Option<String>,
    pub executed_at: Option<String>,
    pub plan_json: String,
}

/// A plan as it appears in its owner's listings. No plan body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub short_token: String,
    pub status: PlanStatus,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub request_text: String,
    pub created_at: String,
    pub expires_at: String,
}

/// One mirrored audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub plan_id: String,
    pub event_type: String,
    pub status: String,
    pub op_id: Option<String>,
    pub op_type: Option<String>,
    pub target_path: Option<String>,
    pub payload_json: String,
    pub prev_hash: String,
    pub event_hash: String,
    pub created_at: String,
}

/// One finished execution, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub plan_id: String,
    pub final_status: PlanStatus,
    pub ops_total: usize,
    pub write_ops: usize,
    pub diff_path: Option<String>,
    pub jsonl_path: String,
    pub chain_head_hash: String,
    pub duration_ms: u64,
    pub created_at: String,
}

pub struct PlanStore {
    conn: Mutex<Connection>,
    plans_dir: PathBuf,
}

// Raw `plans` columns before status/level parsing.
type RawPlanRow = (
    String,
    String,
    String,
    i64,
    String,
    i64,
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

const PLAN_COLUMNS: &str = "plan_id, short_token, status, risk_score, risk_level, \
     requested_by_user_id, chat_id, request_text, created_at, expires_at, \
     approved_at, rejected_at, executed_at, plan_json";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_status(plan_id: &str, raw: &str) -> Result<PlanStatus, StoreError> {
    raw.parse().map_err(|reason| StoreError::Corrupted {
        plan_id: plan_id.to_string(),
        reason,
    })
}

fn parse_level(plan_id: &str, raw: &str) -> Result<RiskLevel, StoreError> {
    raw.parse().map_err(|reason| StoreError::Corrupted {
        plan_id: plan_id.to_string(),
        reason,
    })
}

impl PlanStore {
    /// Open (or create) the database at `sqlite_path` and make sure the
    /// schema exists. Parent directories are created as needed.
    pub fn open(sqlite_path: impl AsRef<Path>, plans_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let sqlite_path = sqlite_path.as_ref();
        if let Some(parent) = sqlite_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(sqlite_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::migrate(&conn)?;
        tracing::debug!(path = %sqlite_path.display(), "plan store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            plans_dir: plans_dir.into(),
        })
    }

    /// An in-memory database, for tests.
    pub fn open_in_memory(plans_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            plans_dir: plans_dir.into(),
        })
    }

    pub fn plans_dir(&self) -> &Path {
        &self.plans_dir
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // The connection holds no half-applied state across a panic; SQLite
        // rolls back any open statement.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── plans ────────────────────────────────────────────────────

    /// Insert a new plan row. Fails with `Duplicate` if the id exists.
    pub fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let plan_json = serde_json::to_string(plan)?;
        let conn = self.conn();
        let exists: Option<String> = conn
            .query_row(
                "SELECT plan_id FROM plans WHERE plan_id = ?1",
                params![plan.plan_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Duplicate(plan.plan_id.clone()));
        }

        conn.execute(
            &format!(
                "INSERT INTO plans ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL, NULL, ?11)",
                PLAN_COLUMNS
            ),
            params![
                plan.plan_id,
                plan.short_token,
                plan.status.as_str(),
                plan.risk.score,
                plan.risk.level.as_str(),
                plan.requested_by.user_id,
                plan.requested_by.channel_id,
                plan.request_text,
                plan.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                plan.expires_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                plan_json,
            ],
        )?;
        Ok(())
    }

    /// Write the pretty JSON snapshot `<plans_dir>/<plan_id>.json`.
    pub fn write_plan_snapshot(&self, plan: &Plan) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.plans_dir).map_err(|source| StoreError::Io {
            path: self.plans_dir.clone(),
            source,
        })?;
        let path = self.plans_dir.join(format!("{}.json", plan.plan_id));
        let json = serde_json::to_string_pretty(plan)?;
        std::fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn get_plan_row(&self, plan_id: &str) -> Result<Option<PlanRow>, StoreError> {
        let raw: Option<RawPlanRow> = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM plans WHERE plan_id = ?1", PLAN_COLUMNS),
                params![plan_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                        row.get(11)?,
                        row.get(12)?,
                        row.get(13)?,
                    ))
                },
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let (
            plan_id,
            short_token,
            status,
            risk_score,
            risk_level,
            requested_by_user_id,
            chat_id,
            request_text,
            created_at,
            expires_at,
            approved_at,
            rejected_at,
            executed_at,
            plan_json,
        ) = raw;

        Ok(Some(PlanRow {
            status: parse_status(&plan_id, &status)?,
            risk_level: parse_level(&plan_id, &risk_level)?,
            risk_score: u32::try_from(risk_score).map_err(|_| StoreError::Corrupted {
                plan_id: plan_id.clone(),
                reason: format!("risk_score {} out of range", risk_score),
            })?,
            plan_id,
            short_token,
            requested_by_user_id,
            chat_id,
            request_text,
            created_at,
            expires_at,
            approved_at,
            rejected_at,
            executed_at,
            plan_json,
        }))
    }

    /// `(user_id, chat_id)` that created the plan.
    pub fn get_plan_owner(&self, plan_id: &str) -> Result<Option<(i64, i64)>, StoreError> {
        let owner = self
            .conn()
            .query_row(
                "SELECT requested_by_user_id, chat_id FROM plans WHERE plan_id = ?1",
                params![plan_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn get_status(&self, plan_id: &str) -> Result<Option<PlanStatus>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM plans WHERE plan_id = ?1",
                params![plan_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| parse_status(plan_id, &s)).transpose()
    }

    /// Compare-and-set `from -> to`, stamping the matching lifecycle
    /// column. Returns `false` when the row was not in `from` (or does not
    /// exist).
    pub fn transition_status(&self, plan_id: &str, from: PlanStatus, to: PlanStatus) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition { from, to });
        }
        let stamp_column = match to {
            PlanStatus::Approved => Some("approved_at"),
            PlanStatus::Rejected => Some("rejected_at"),
            PlanStatus::Executed | PlanStatus::Failed => Some("executed_at"),
            PlanStatus::Expired | PlanStatus::PendingApproval => None,
        };

        let conn = self.conn();
        let changed = match stamp_column {
            Some(column) => conn.execute(
                &format!(
                    "UPDATE plans SET status = ?3, {} = ?4 WHERE plan_id = ?1 AND status = ?2",
                    column
                ),
                params![plan_id, from.as_str(), to.as_str(), now_rfc3339()],
            )?,
            None => conn.execute(
                "UPDATE plans SET status = ?3 WHERE plan_id = ?1 AND status = ?2",
                params![plan_id, from.as_str(), to.as_str()],
            )?,
        };

        if changed == 1 {
            tracing::info!(plan_id = %plan_id, from = %from, to = %to, "plan status changed");
        }
        Ok(changed == 1)
    }

    /// Newest first, at most `limit` (clamped to 1..=50), optionally only
    /// one status.
    pub fn list_plans_for_user(
        &self,
        user_id: i64,
        limit: usize,
        status: Option<PlanStatus>,
    ) -> Result<Vec<PlanSummary>, StoreError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT) as i64;
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT plan_id, short_token, status, risk_score, risk_level, request_text, created_at, expires_at
             FROM plans
             WHERE requested_by_user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, plan_id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, status.map(|s| s.as_str()), limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (plan_id, short_token, status, score, level, request_text, created_at, expires_at) = row?;
            out.push(PlanSummary {
                short_token,
                status: parse_status(&plan_id, &status)?,
                risk_level: parse_level(&plan_id, &level)?,
                risk_score: score.clamp(0, 100) as u32,
                plan_id,
                request_text,
                created_at,
                expires_at,
            });
        }
        Ok(out)
    }

    // ── events ───────────────────────────────────────────────────

    pub fn insert_event(&self, event: &AuditEvent, op: Option<&OpMeta>) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(&event.payload)?;
        self.conn().execute(
            "INSERT INTO events (event_id, plan_id, event_type, status, op_id, op_type, target_path,
                                 payload_json, prev_hash, event_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event.event_id,
                event.plan_id,
                event.event_type.as_str(),
                event.status,
                op.map(|o| o.op_id.as_str()),
                op.map(|o| o.op_type.as_str()),
                op.map(|o| o.target_path.as_str()),
                payload_json,
                event.prev_hash,
                event.event_hash,
                event.ts,
            ],
        )?;
        Ok(())
    }

    /// Mirrored events for a plan in the order they were appended.
    pub fn get_events(&self, plan_id: &str) -> Result<Vec<EventRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT event_id, plan_id, event_type, status, op_id, op_type, target_path,
                    payload_json, prev_hash, event_hash, created_at
             FROM events WHERE plan_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![plan_id], |row| {
            Ok(EventRow {
                event_id: row.get(0)?,
                plan_id: row.get(1)?,
                event_type: row.get(2)?,
                status: row.get(3)?,
                op_id: row.get(4)?,
                op_type: row.get(5)?,
                target_path: row.get(6)?,
                payload_json: row.get(7)?,
                prev_hash: row.get(8)?,
                event_hash: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?;
        let events = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // ── audit summaries ──────────────────────────────────────────

    pub fn insert_audit_summary(&self, summary: &AuditSummary) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO audit (plan_id, final_status, ops_total, write_ops, diff_path, jsonl_path,
                                chain_head_hash, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                summary.plan_id,
                summary.final_status.as_str(),
                summary.ops_total as i64,
                summary.write_ops as i64,
                summary.diff_path,
                summary.jsonl_path,
                summary.chain_head_hash,
                summary.duration_ms as i64,
                summary.created_at,
            ],
        )?;
        Ok(())
    }

    /// Latest summary row for a plan.
    pub fn get_audit_summary(&self, plan_id: &str) -> Result<Option<AuditSummary>, StoreError> {
        let raw = self
            .conn()
            .query_row(
                "SELECT plan_id, final_status, ops_total, write_ops, diff_path, jsonl_path,
                        chain_head_hash, duration_ms, created_at
                 FROM audit WHERE plan_id = ?1 ORDER BY id DESC LIMIT 1",
                params![plan_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((plan_id, status, ops_total, write_ops, diff_path, jsonl_path, head, duration_ms, created_at)) = raw
        else {
            return Ok(None);
        };
        Ok(Some(AuditSummary {
            final_status: parse_status(&plan_id, &status)?,
            plan_id,
            ops_total: ops_total.max(0) as usize,
            write_ops: write_ops.max(0) as usize,
            diff_path,
            jsonl_path,
            chain_head_hash: head,
            duration_ms: duration_ms.max(0) as u64,
            created_at,
        }))
    }
}

impl AuditMirror for PlanStore {
    fn record_event(&self, event: &AuditEvent, op: Option<&OpMeta>) -> Result<(), AuditError> {
        self.insert_event(event, op)
            .map_err(|e| AuditError::Mirror(e.to_string()))
    }

    fn mirrored_hashes(&self, plan_id: &str) -> Result<Vec<MirroredHash>, AuditError> {
        let rows = self
            .get_events(plan_id)
            .map_err(|e| AuditError::Mirror(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| MirroredHash {
                event_id: row.event_id,
                prev_hash: row.prev_hash,
                event_hash: row.event_hash,
            })
            .collect())
    }
}
