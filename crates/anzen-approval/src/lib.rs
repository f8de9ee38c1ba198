//! # anzen-approval
//!
//! Owns every plan status change.
//!
//! ```text
//!   PENDING_APPROVAL ──approve──▶ APPROVED ──▶ EXECUTED
//!         │    │                      └──────▶ FAILED
//!         │    └──reject──▶ REJECTED
//!         └──(expired at approve time)──▶ EXPIRED
//! ```
//!
//! Approval needs the plan id and its single-use short token. Expiry is
//! checked lazily, only when someone tries to approve. All transitions are
//! compare-and-set in the store, so of two racing approvals exactly one
//! wins and the other sees a non-pending status.

pub mod error;
pub mod service;

pub use error::ApprovalError;
pub use service::ApprovalService;
