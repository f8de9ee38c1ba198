//! # anzen-diff
//!
//! Turns the write operations of one executed plan into a single reviewable
//! unified patch, plus per-file SHA-256 hashes of the content before and
//! after. The patch is written once, to `<plan_id>.patch`, and never
//! rewritten.

pub mod error;
pub mod service;

pub use error::DiffError;
pub use service::{DiffArtifact, DiffService, FileDiff, WriteItem};
