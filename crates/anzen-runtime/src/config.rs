// config.rs — Runtime configuration.
//
// RuntimeConfig pins down where one instance keeps its state. The storage
// section of the policy names paths relative to the workspace root;
// `for_workspace()` resolves them so every component gets absolute paths
// and nothing depends on the process working directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anzen_policy::PolicyConfig;

/// Everything a `Runtime` needs to open its components.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// The only directory plans may touch.
    pub workspace_root: PathBuf,

    /// SQLite database holding plans, mirrored events and audit rows.
    pub sqlite_path: PathBuf,

    /// Pretty-JSON plan snapshots, one file per plan.
    pub plans_dir: PathBuf,

    /// Per-plan hash-chained JSONL logs.
    pub audit_jsonl_dir: PathBuf,

    /// Per-plan unified diff artifacts.
    pub audit_diff_dir: PathBuf,

    /// The policy in force. Shared, never mutated.
    pub policy: Arc<PolicyConfig>,
}

impl RuntimeConfig {
    /// Resolve the policy's storage paths under `workspace_root`.
    /// Absolute storage paths are kept as given.
    pub fn for_workspace(workspace_root: impl AsRef<Path>, policy: PolicyConfig) -> Self {
        let root = workspace_root.as_ref().to_path_buf();
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        Self {
            sqlite_path: resolve(&policy.storage.sqlite),
            plans_dir: resolve(&policy.storage.plans_dir),
            audit_jsonl_dir: resolve(&policy.storage.audit_jsonl_dir),
            audit_diff_dir: resolve(&policy.storage.audit_diff_dir),
            workspace_root: root,
            policy: Arc::new(policy),
        }
    }
}
