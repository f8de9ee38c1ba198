//! # anzen-executor
//!
//! Applies an APPROVED plan to the real workspace, one op at a time, in
//! plan order.
//!
//! Nothing decided at plan-creation time is trusted here. Before each op
//! the executor re-checks that the op type is still allowed and re-runs the
//! path guard against the current filesystem. The first failure stops the
//! plan and marks it FAILED. Ops that already ran stay applied: there is no
//! rollback.
//!
//! Each completed op is appended to the plan's audit chain as it finishes,
//! so the trail shows exactly how far a failed plan got. Write ops are
//! collected and rendered into one diff artifact at the end.

pub mod error;
pub mod executor;
pub mod outcome;

pub use error::{ExecutionError, OpFailure};
pub use executor::{ExecutionResult, Executor, LIST_PREVIEW_LIMIT};
pub use outcome::{OpOutcome, OpSummary};
