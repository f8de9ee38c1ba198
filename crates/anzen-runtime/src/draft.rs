// draft.rs — The plan-draft collaborator seam.
//
// The runtime asks one question of the drafting side: given request text,
// the allowed op types and the allowed path prefixes, which ops should run?
// What answers that question is a closed set of engines behind one trait.
// Nothing an engine returns is trusted; the planner re-validates all of it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use anzen_plan::DraftPlan;
use anzen_policy::{EngineConfig, EngineMode};

use crate::command;
use crate::error::CollaboratorError;

/// What the drafting side is told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub request_text: String,
    pub allowed_ops: Vec<String>,
    pub allowed_prefixes: Vec<String>,
}

/// Anything that can turn a request into a draft plan.
pub trait PlanDraftClient: Send + Sync {
    fn draft_plan(&self, request: &DraftRequest) -> Result<DraftPlan, CollaboratorError>;
}

/// The engines this runtime knows how to drive.
#[derive(Debug, Clone)]
pub enum DraftEngine {
    /// Always returns the same draft. Used offline and in tests.
    Scripted(DraftPlan),
    /// An external planner speaking JSON over stdin/stdout.
    Command {
        command: String,
        args: Vec<String>,
        timeout: Duration,
    },
}

impl DraftEngine {
    /// Pick the engine named by the policy. Scripted mode has nothing to
    /// say unless a draft is supplied.
    pub fn from_config(engine: &EngineConfig, scripted: Option<DraftPlan>) -> Result<Self, CollaboratorError> {
        match (engine.mode, scripted) {
            (_, Some(draft)) => Ok(DraftEngine::Scripted(draft)),
            (EngineMode::Command, None) => Ok(DraftEngine::Command {
                command: engine.command.clone(),
                args: engine.args.clone(),
                timeout: Duration::from_secs(engine.timeout_seconds),
            }),
            (EngineMode::Scripted, None) => Err(CollaboratorError::Unavailable(
                "scripted engine needs a draft file".to_string(),
            )),
        }
    }

    pub fn mode(&self) -> EngineMode {
        match self {
            DraftEngine::Scripted(_) => EngineMode::Scripted,
            DraftEngine::Command { .. } => EngineMode::Command,
        }
    }
}

/// Wire shape of a draft request sent to a planner command.
#[derive(Serialize)]
struct CommandDraftRequest<'a> {
    kind: &'static str,
    #[serde(flatten)]
    request: &'a DraftRequest,
}

impl PlanDraftClient for DraftEngine {
    fn draft_plan(&self, request: &DraftRequest) -> Result<DraftPlan, CollaboratorError> {
        match self {
            DraftEngine::Scripted(draft) => Ok(draft.clone()),
            DraftEngine::Command {
                command,
                args,
                timeout,
            } => {
                let input = serde_json::to_vec(&CommandDraftRequest {
                    kind: "plan",
                    request,
                })
                .map_err(|e| CollaboratorError::Malformed {
                    command: command.clone(),
                    reason: e.to_string(),
                })?;
                let out = command::exchange(command, args, &input, *timeout)?;
                let draft: DraftPlan =
                    serde_json::from_str(out.trim()).map_err(|e| CollaboratorError::Malformed {
                        command: command.clone(),
                        reason: e.to_string(),
                    })?;
                tracing::info!(command = %command, ops = draft.ops.len(), "draft received");
                Ok(draft)
            }
        }
    }
}
