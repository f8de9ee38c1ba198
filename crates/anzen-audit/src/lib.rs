//! # anzen-audit
//!
//! Tamper-evident audit trail for plans.
//!
//! Every lifecycle step of a plan (creation, approval, each executed op,
//! failure, completion) is recorded as an [`AuditEvent`] in a per-plan JSONL
//! file. Each event commits to the previous one through `prev_hash`, and its
//! own `event_hash` is the SHA-256 of a canonical JSON encoding, so deleting,
//! reordering or editing a line breaks the chain.
//!
//! The same events are mirrored into a queryable store through the
//! [`AuditMirror`] trait. The file and the mirror are two sinks of one
//! logical append: if the file write lands and the mirror write does not,
//! the logger reports [`AuditError::ConsistencyFault`] instead of carrying
//! on quietly.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use anzen_audit::{AuditEventType, AuditLogger};
//!
//! let logger = AuditLogger::new("/tmp/audit/jsonl", None);
//! let event = logger
//!     .append("pln_20260101000000abcdef", AuditEventType::PlanCreated, "PENDING_APPROVAL",
//!             serde_json::json!({"ops": 1}), None)
//!     .unwrap();
//! assert_eq!(event.prev_hash, "GENESIS");
//! ```

pub mod canonical;
pub mod error;
pub mod event;
pub mod hasher;
pub mod logger;

pub use error::AuditError;
pub use event::{AuditEvent, AuditEventType, OpMeta, GENESIS};
pub use logger::{AuditLogger, AuditMirror, ChainReport, MirroredHash};
