// path_guard.rs — Workspace-relative path enforcement.
//
// Every path an LLM draft mentions passes through `enforce()` twice: once
// when the plan is created (reject bad drafts early) and again right before
// the executor touches the filesystem (the filesystem or the policy may
// have changed in between).
//
// Checks, in order:
// 1. Normalize separators; reject empty, UNC, absolute, drive-letter forms
// 2. Reject `..`, empty, and `.` segments (bare "." is the listing root)
// 3. Require an allowed prefix; reject blocked glob patterns
// 4. Walk existing segments from the root; reject symlinks and reparse points
// 5. Assert the resolved candidate stays inside the canonical root

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::config::PolicyConfig;
use crate::error::PathGuardViolation;

/// A path that passed every guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    /// Normalized workspace-relative form (forward slashes, no `./`).
    pub rel_path: String,
    /// Absolute location under the canonicalized workspace root.
    pub abs_path: PathBuf,
}

/// Bundles a workspace root with the policy's path rules.
///
/// Holds no cached verdicts: every `enforce` call re-reads the filesystem.
#[derive(Debug, Clone)]
pub struct PathGuard {
    workspace_root: PathBuf,
    allowed_prefixes: Vec<String>,
    blocked_patterns: Vec<String>,
}

impl PathGuard {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        allowed_prefixes: Vec<String>,
        blocked_patterns: Vec<String>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            allowed_prefixes,
            blocked_patterns,
        }
    }

    pub fn from_policy(workspace_root: impl Into<PathBuf>, policy: &PolicyConfig) -> Self {
        Self::new(
            workspace_root,
            policy.allowed_path_prefixes.clone(),
            policy.blocked_path_patterns.clone(),
        )
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn enforce(&self, rel_path: &str) -> Result<SafePath, PathGuardViolation> {
        enforce(
            &self.workspace_root,
            rel_path,
            &self.allowed_prefixes,
            &self.blocked_patterns,
        )
    }
}

/// Validate and resolve `rel_path` inside `workspace_root`.
pub fn enforce(
    workspace_root: &Path,
    rel_path: &str,
    allowed_prefixes: &[String],
    blocked_patterns: &[String],
) -> Result<SafePath, PathGuardViolation> {
    let normalized = normalize_rel(rel_path)?;

    if !is_allowed_prefix(&normalized, allowed_prefixes) {
        return Err(PathGuardViolation::OutsidePrefixes { path: normalized });
    }
    if let Some(pattern) = blocked_by(&normalized, blocked_patterns) {
        return Err(PathGuardViolation::BlockedPattern {
            path: normalized,
            pattern: pattern.to_string(),
        });
    }

    let root = workspace_root
        .canonicalize()
        .map_err(|source| PathGuardViolation::WorkspaceUnavailable {
            root: workspace_root.to_path_buf(),
            source,
        })?;

    reject_linked_segments(&root, &normalized)?;

    let candidate = if normalized == "." {
        root.clone()
    } else {
        root.join(&normalized)
    };
    ensure_within_workspace(&root, &candidate, &normalized)?;

    Ok(SafePath {
        rel_path: normalized,
        abs_path: candidate,
    })
}

/// Normalize a relative path and reject every non-relative or ambiguous form.
///
/// Returns `"."` for the workspace root itself.
pub fn normalize_rel(rel_path: &str) -> Result<String, PathGuardViolation> {
    let value = rel_path.trim().replace('\\', "/");
    if value.is_empty() {
        return Err(PathGuardViolation::Empty);
    }
    if value.starts_with("//") {
        return Err(PathGuardViolation::Unc { path: value });
    }
    if value.starts_with('/') {
        return Err(PathGuardViolation::Absolute { path: value });
    }
    if value.chars().nth(1) == Some(':') {
        return Err(PathGuardViolation::DriveLetter { path: value });
    }

    let value = value.strip_prefix("./").unwrap_or(value.as_str()).to_string();
    if value == "." {
        return Ok(value);
    }

    let parts: Vec<&str> = value.split('/').collect();
    if parts.iter().any(|p| *p == "..") {
        return Err(PathGuardViolation::ParentTraversal { path: value });
    }
    if parts.iter().any(|p| p.is_empty() || *p == ".") {
        return Err(PathGuardViolation::InvalidSegment { path: value });
    }
    Ok(parts.join("/"))
}

/// Prefix match on whole segments: "docs" admits "docs" and "docs/a.md",
/// never "docsx/a.md".
fn is_allowed_prefix(rel_path: &str, allowed_prefixes: &[String]) -> bool {
    if rel_path == "." {
        return true;
    }
    allowed_prefixes.iter().any(|prefix| {
        let p = prefix.trim().replace('\\', "/");
        let p = p.trim_end_matches('/');
        !p.is_empty() && (rel_path == p || rel_path.starts_with(&format!("{}/", p)))
    })
}

/// First blocked pattern matching the path, if any.
///
/// An unparseable pattern counts as a match (fail-closed).
fn blocked_by<'a>(rel_path: &str, blocked_patterns: &'a [String]) -> Option<&'a str> {
    blocked_patterns
        .iter()
        .find(|pattern| match Pattern::new(pattern) {
            Ok(p) => p.matches(rel_path),
            Err(_) => true,
        })
        .map(|s| s.as_str())
}

fn reject_linked_segments(root: &Path, rel_path: &str) -> Result<(), PathGuardViolation> {
    if rel_path == "." {
        return Ok(());
    }

    let mut current = root.to_path_buf();
    for part in rel_path.split('/') {
        current.push(part);
        // symlink_metadata does not follow links, so a dangling link is caught too.
        let meta = match fs::symlink_metadata(&current) {
            Ok(meta) => meta,
            Err(_) => break, // nothing exists from here down
        };
        if meta.file_type().is_symlink() {
            return Err(PathGuardViolation::LinkedSegment {
                path: rel_path.to_string(),
                segment: part.to_string(),
            });
        }
        if is_reparse_point(&meta) {
            return Err(PathGuardViolation::ReparsePoint {
                path: rel_path.to_string(),
                segment: part.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(windows)]
fn is_reparse_point(meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0
}

#[cfg(not(windows))]
fn is_reparse_point(_meta: &fs::Metadata) -> bool {
    false
}

fn ensure_within_workspace(
    root: &Path,
    candidate: &Path,
    rel_path: &str,
) -> Result<(), PathGuardViolation> {
    if !candidate.starts_with(root) {
        return Err(PathGuardViolation::EscapesWorkspace {
            path: rel_path.to_string(),
        });
    }

    // Resolve the deepest existing ancestor and check it too.
    let mut ancestor = candidate;
    loop {
        if let Ok(resolved) = ancestor.canonicalize() {
            if !resolved.starts_with(root) {
                return Err(PathGuardViolation::EscapesWorkspace {
                    path: rel_path.to_string(),
                });
            }
            return Ok(());
        }
        match ancestor.parent() {
            Some(parent) => ancestor = parent,
            None => return Ok(()),
        }
    }
}
