//! # anzen-runtime
//!
//! Composes the Anzen plan gate into the handful of operations a front-end
//! calls: create a plan, approve and execute it, reject it, and inspect
//! status, logs and audit chains.
//!
//! ```text
//!   request text ──▶ allowlist ──▶ rate limit ──▶ draft collaborator
//!        │                                            │
//!        │            ┌───────────────────────────────┘
//!        ▼            ▼
//!   PlannerService: parse ▸ op-type check ▸ path guard ▸ risk ▸ persist
//!                                                       │
//!   approve(plan_id, token) ◀───── later, by the owner ─┘
//!        │
//!        ▼
//!   Executor: re-check ▸ apply ▸ OP_EXECUTED per op ▸ diff ▸ EXECUTED/FAILED
//! ```
//!
//! The drafting and chat sides are collaborators behind
//! [`PlanDraftClient`] and [`ChatAnswerClient`]. The shipped engines are the
//! closed enums [`DraftEngine`] and [`ChatEngine`]; tests inject their own.

pub mod chat;
mod command;
pub mod config;
pub mod draft;
pub mod error;
pub mod planner;
pub mod runtime;

pub use chat::{ChatAnswerClient, ChatEngine};
pub use config::RuntimeConfig;
pub use draft::{DraftEngine, DraftRequest, PlanDraftClient};
pub use error::{CollaboratorError, PolicyViolation, RuntimeError};
pub use planner::{CreatedPlan, PlannerService};
pub use runtime::{
    LogsView, Runtime, RuntimeStatus, MAX_CHAT_ANSWER_CHARS, PENDING_PLANS_LIMIT, RECENT_PLANS_LIMIT,
};
