// mod.rs — Shared plumbing for subcommands.
//
// Each invocation opens one Runtime for one acting user. Rate limits are
// in-memory, so they only bound what a single invocation does.

pub mod approve;
pub mod ask;
pub mod audit;
pub mod plan;
pub mod status;

use std::path::PathBuf;

use anyhow::Context as _;

use anzen_plan::DraftPlan;
use anzen_policy::PolicyConfig;
use anzen_runtime::{ChatEngine, DraftEngine, Runtime, RuntimeConfig};

/// Who is acting, where, under which policy.
pub struct Context {
    pub workspace: PathBuf,
    pub policy: PolicyConfig,
    pub user_id: i64,
    pub channel_id: i64,
}

impl Context {
    pub fn new(workspace: PathBuf, policy_path: Option<PathBuf>, user_id: i64, channel_id: i64) -> anyhow::Result<Self> {
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("workspace not found: {}", workspace.display()))?;
        let policy_path = policy_path.unwrap_or_else(|| workspace.join("config").join("policy.yaml"));
        let policy = PolicyConfig::load(&policy_path)
            .with_context(|| format!("loading policy from {}", policy_path.display()))?;
        Ok(Self {
            workspace,
            policy,
            user_id,
            channel_id,
        })
    }

    /// Open a runtime drafting with `drafts`.
    pub fn open_with(&self, drafts: DraftEngine) -> anyhow::Result<Runtime> {
        let config = RuntimeConfig::for_workspace(&self.workspace, self.policy.clone());
        let chat = ChatEngine::from_config(&self.policy.engine);
        Runtime::open(config, Box::new(drafts), Box::new(chat)).context("opening runtime")
    }

    /// Open a runtime for commands that never draft.
    pub fn open(&self) -> anyhow::Result<Runtime> {
        self.open_with(DraftEngine::Scripted(DraftPlan::default()))
    }
}
