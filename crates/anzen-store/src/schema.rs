// schema.rs — SQLite schema for plans, audit events, and summaries.
//
// Timestamps are RFC 3339 UTC strings. `events` keeps insertion order in
// its implicit rowid, which is the order the audit chain was written in.

use rusqlite::Connection;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS plans (
    plan_id              TEXT PRIMARY KEY,
    short_token          TEXT NOT NULL,
    status               TEXT NOT NULL,
    risk_score           INTEGER NOT NULL,
    risk_level           TEXT NOT NULL,
    requested_by_user_id INTEGER NOT NULL,
    chat_id              INTEGER NOT NULL,
    request_text         TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    expires_at           TEXT NOT NULL,
    approved_at          TEXT,
    rejected_at          TEXT,
    executed_at          TEXT,
    plan_json            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_plans_user_created
    ON plans (requested_by_user_id, created_at);

CREATE TABLE IF NOT EXISTS events (
    event_id     TEXT PRIMARY KEY,
    plan_id      TEXT NOT NULL REFERENCES plans (plan_id),
    event_type   TEXT NOT NULL,
    status       TEXT NOT NULL,
    op_id        TEXT,
    op_type      TEXT,
    target_path  TEXT,
    payload_json TEXT NOT NULL,
    prev_hash    TEXT NOT NULL,
    event_hash   TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_plan ON events (plan_id);

CREATE TABLE IF NOT EXISTS audit (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    plan_id         TEXT NOT NULL REFERENCES plans (plan_id),
    final_status    TEXT NOT NULL,
    ops_total       INTEGER NOT NULL,
    write_ops       INTEGER NOT NULL,
    diff_path       TEXT,
    jsonl_path      TEXT NOT NULL,
    chain_head_hash TEXT NOT NULL,
    duration_ms     INTEGER NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_plan ON audit (plan_id);
";

/// Apply connection pragmas and create any missing tables.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)
}
