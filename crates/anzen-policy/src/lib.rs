//! # anzen-policy
//!
//! The policy layer of the Anzen plan gate.
//!
//! Everything here is evaluated *before* any filesystem mutation happens:
//!
//! - [`PolicyConfig`] — the YAML policy file, parsed then validated. It is an
//!   ordinary value threaded through constructors, never global state.
//! - [`path_guard`] — resolves a workspace-relative path against the
//!   allow/deny rules and rejects traversal, absolute forms, and link
//!   indirection. Called at plan creation *and* again at execution.
//! - [`RateLimiter`] — sliding-window limiter keyed by (user, bucket).
//!
//! ## Key invariants
//!
//! - **Default deny**: a path outside every allowed prefix is rejected.
//! - **No indirection**: any existing symlink (or junction) along the path
//!   is rejected, so a swapped link cannot redirect an approved write.
//! - **Containment**: the resolved candidate must stay inside the
//!   canonicalized workspace root.

pub mod config;
pub mod error;
pub mod path_guard;
pub mod rate_limit;

pub use config::{
    EngineConfig, EngineMode, ExecutorPolicy, InstanceConfig, PlanPolicy, PolicyConfig,
    RateLimitConfig, RiskLevel, RiskPolicy, RiskScoringConfig, StorageConfig, UsersPolicy,
    KNOWN_OPS,
};
pub use error::{PathGuardViolation, PolicyError, RateLimitExceeded};
pub use path_guard::{enforce, normalize_rel, PathGuard, SafePath};
pub use rate_limit::{LimitPolicy, RateBucket, RateLimiter};
