//! # anzen-plan
//!
//! The plan contract: what an LLM draft must look like before anyone is
//! asked to approve it.
//!
//! A [`Plan`] is an ordered batch of filesystem [`PlanOp`]s plus the
//! requester, expiry, a snapshot of the policy in force, and a
//! [`RiskReport`]. Plans are built from an untrusted [`DraftPlan`] by an
//! explicit parse-then-validate step; every check is a guard clause run in
//! a fixed order, so the same bad draft always yields the same error.
//!
//! ## Key components
//!
//! - [`Plan`] / [`PlanOp`] / [`PlanStatus`] — the data model and the
//!   status transition graph
//! - [`RiskEngine`] — deterministic risk rubric (no I/O)
//! - [`ids`] — time-sortable plan ids and single-use short tokens
//! - [`patch`] — the full-replacement patch envelope

pub mod draft;
pub mod error;
pub mod ids;
pub mod model;
pub mod patch;
pub mod risk;

pub use anzen_policy::RiskLevel;
pub use draft::{DraftOp, DraftPlan};
pub use error::PlanError;
pub use model::{
    OpType, Plan, PlanOp, PlanStatus, PolicySnapshot, RequestedBy, RiskReport, MAX_OPS,
    MAX_REQUEST_CHARS,
};
pub use risk::RiskEngine;
