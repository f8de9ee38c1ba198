//! # anzen-store
//!
//! Durable state for the plan gate, in one SQLite database:
//!
//! - `plans` — one row per plan: status, token, requester, risk, lifecycle
//!   timestamps and the full validated plan JSON
//! - `events` — the queryable mirror of every audit event (see
//!   [`anzen_audit::AuditMirror`])
//! - `audit` — one summary row per finished execution
//!
//! Status changes are compare-and-set updates guarded by the expected
//! current status, so two racing approvals cannot both win.
//!
//! Each created plan is also written as a pretty JSON snapshot under the
//! plans directory for out-of-band inspection. The snapshot is never read
//! back; the database is authoritative.

pub mod error;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use store::{AuditSummary, EventRow, PlanRow, PlanStore, PlanSummary, MAX_LIST_LIMIT};
