// executor.rs — Apply an approved plan to the workspace.
//
// Order of work for `execute`:
// 1. Refuse unless the store says APPROVED (no filesystem access before this)
// 2. For each op in plan order: re-check op type, re-run the path guard,
//    apply, append OP_EXECUTED to the audit chain
// 3. Render the write ops into one diff artifact
// 4. Mark EXECUTED, or FAILED on any error from steps 2 to 4
//
// There is no rollback. A plan that fails at op N leaves ops 1..N-1 applied.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use anzen_approval::ApprovalService;
use anzen_audit::{AuditError, AuditEventType, AuditLogger, OpMeta};
use anzen_diff::{DiffArtifact, DiffService, WriteItem};
use anzen_plan::patch::decode_envelope;
use anzen_plan::{OpType, Plan, PlanOp, PlanStatus};
use anzen_policy::{PathGuard, PolicyConfig, SafePath};

use crate::error::{ExecutionError, OpFailure};
use crate::outcome::{OpOutcome, OpSummary};

/// How many directory entries a listing reports by name.
pub const LIST_PREVIEW_LIMIT: usize = 10;

/// What a successful execution produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub status: PlanStatus,
    pub op_summaries: Vec<OpSummary>,
    pub diff_artifact: Option<DiffArtifact>,
    pub write_op_count: usize,
    pub duration_ms: u64,
}

pub struct Executor {
    policy: Arc<PolicyConfig>,
    guard: PathGuard,
    approval: Arc<ApprovalService>,
    audit: Arc<AuditLogger>,
    diff: DiffService,
}

impl Executor {
    pub fn new(
        workspace_root: impl Into<std::path::PathBuf>,
        policy: Arc<PolicyConfig>,
        approval: Arc<ApprovalService>,
        audit: Arc<AuditLogger>,
        diff: DiffService,
    ) -> Self {
        let guard = PathGuard::from_policy(workspace_root, &policy);
        Self {
            policy,
            guard,
            approval,
            audit,
            diff,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        self.guard.workspace_root()
    }

    /// Run `plan`. On failure the plan has already been marked FAILED when
    /// this returns, except for `NotApproved` or a failed status read,
    /// which change nothing.
    pub fn execute(&self, plan: &Plan) -> Result<ExecutionResult, ExecutionError> {
        let status = self.approval.get_status(&plan.plan_id)?;
        if status != PlanStatus::Approved {
            tracing::warn!(plan_id = %plan.plan_id, status = %status, "refusing to execute unapproved plan");
            return Err(ExecutionError::NotApproved {
                plan_id: plan.plan_id.clone(),
                status,
            });
        }

        let started = Instant::now();
        tracing::info!(plan_id = %plan.plan_id, ops = plan.ops.len(), "executing plan");

        let outcome = self.apply_all(plan, started).and_then(|result| {
            self.approval
                .mark_executed(&plan.plan_id)
                .map_err(|source| ExecutionError::Finalize {
                    plan_id: plan.plan_id.clone(),
                    completed_ops: result.op_summaries.len(),
                    write_ops: result.write_op_count,
                    source,
                })?;
            Ok(result)
        });

        match outcome {
            Ok(result) => {
                tracing::info!(
                    plan_id = %plan.plan_id,
                    writes = result.write_op_count,
                    duration_ms = result.duration_ms,
                    "plan executed"
                );
                Ok(ExecutionResult {
                    status: PlanStatus::Executed,
                    ..result
                })
            }
            Err(err) => {
                tracing::error!(plan_id = %plan.plan_id, error = %err, "plan execution failed");
                if let Err(mark_err) = self.approval.mark_failed(&plan.plan_id) {
                    tracing::error!(plan_id = %plan.plan_id, error = %mark_err, "could not mark plan FAILED");
                }
                Err(err)
            }
        }
    }

    fn apply_all(&self, plan: &Plan, started: Instant) -> Result<ExecutionResult, ExecutionError> {
        let mut summaries = Vec::with_capacity(plan.ops.len());
        let mut writes: Vec<WriteItem> = Vec::new();

        for op in &plan.ops {
            let (outcome, write) = self.apply_op(op).map_err(|source| ExecutionError::OpFailed {
                plan_id: plan.plan_id.clone(),
                op_id: op.op_id.clone(),
                completed_ops: summaries.len(),
                write_ops: writes.len(),
                source,
            })?;

            let summary = OpSummary {
                op_id: op.op_id.clone(),
                op_type: op.op_type,
                path: op.path.clone(),
                outcome,
            };
            let recorded = self.record_op(plan, op, &summary);
            summaries.push(summary);
            if let Some(item) = write {
                writes.push(item);
            }
            recorded.map_err(|source| ExecutionError::Audit {
                plan_id: plan.plan_id.clone(),
                completed_ops: summaries.len(),
                write_ops: writes.len(),
                source,
            })?;
        }

        let diff_artifact = if writes.is_empty() {
            None
        } else {
            Some(
                self.diff
                    .write_patch(&plan.plan_id, &writes)
                    .map_err(|source| ExecutionError::Diff {
                        plan_id: plan.plan_id.clone(),
                        completed_ops: summaries.len(),
                        write_ops: writes.len(),
                        source,
                    })?,
            )
        };

        Ok(ExecutionResult {
            plan_id: plan.plan_id.clone(),
            status: PlanStatus::Approved,
            op_summaries: summaries,
            diff_artifact,
            write_op_count: writes.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn record_op(&self, plan: &Plan, op: &PlanOp, summary: &OpSummary) -> Result<(), AuditError> {
        let payload = serde_json::json!({
            "op_id": summary.op_id,
            "type": summary.op_type,
            "path": summary.path,
            "outcome": summary.outcome,
        });
        let meta = OpMeta {
            op_id: op.op_id.clone(),
            op_type: op.op_type.as_str().to_string(),
            target_path: op.path.clone(),
        };
        self.audit.append(
            &plan.plan_id,
            AuditEventType::OpExecuted,
            PlanStatus::Approved.as_str(),
            payload,
            Some(&meta),
        )?;
        Ok(())
    }

    /// Re-check and apply one op. Returns the outcome and, for writes, the
    /// before/after pair for the diff.
    fn apply_op(&self, op: &PlanOp) -> Result<(OpOutcome, Option<WriteItem>), OpFailure> {
        if !self.policy.is_op_allowed(op.op_type.as_str()) {
            return Err(OpFailure::OpNotAllowed(op.op_type.as_str().to_string()));
        }
        let target = self.guard.enforce(&op.path)?;
        tracing::debug!(op_id = %op.op_id, op_type = %op.op_type, path = %target.rel_path, "applying op");

        match op.op_type {
            OpType::ListDir => list_dir(&target).map(|o| (o, None)),
            OpType::ReadFile => read_file(&target).map(|o| (o, None)),
            OpType::CreateFile => {
                let content = op
                    .content
                    .as_deref()
                    .ok_or(OpFailure::MissingPayload { field: "content" })?;
                create_file(&target, content)
            }
            OpType::PatchFile => {
                let patch = op
                    .patch
                    .as_deref()
                    .ok_or(OpFailure::MissingPayload { field: "patch" })?;
                patch_file(&target, patch)
            }
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> OpFailure + '_ {
    move |source| OpFailure::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn count_lines(text: &str) -> usize {
    text.lines().count()
}

fn list_dir(target: &SafePath) -> Result<OpOutcome, OpFailure> {
    let meta = match fs::symlink_metadata(&target.abs_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(OpOutcome::Skipped {
                reason: "target does not exist".to_string(),
            });
        }
        Err(source) => return Err(io_err(&target.abs_path)(source)),
    };
    if !meta.is_dir() {
        return Err(OpFailure::NotADirectory(target.rel_path.clone()));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&target.abs_path).map_err(io_err(&target.abs_path))? {
        let entry = entry.map_err(io_err(&target.abs_path))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    Ok(OpOutcome::Listed {
        entries: names.len(),
        preview: names.into_iter().take(LIST_PREVIEW_LIMIT).collect(),
    })
}

fn read_file(target: &SafePath) -> Result<OpOutcome, OpFailure> {
    let meta = match fs::symlink_metadata(&target.abs_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(OpFailure::TargetMissing(target.rel_path.clone()));
        }
        Err(source) => return Err(io_err(&target.abs_path)(source)),
    };
    if !meta.is_file() {
        return Err(OpFailure::NotAFile(target.rel_path.clone()));
    }

    let bytes = fs::read(&target.abs_path).map_err(io_err(&target.abs_path))?;
    let lines = count_lines(&String::from_utf8_lossy(&bytes));
    Ok(OpOutcome::Read {
        bytes: bytes.len() as u64,
        lines,
    })
}

fn create_file(target: &SafePath, content: &str) -> Result<(OpOutcome, Option<WriteItem>), OpFailure> {
    if fs::symlink_metadata(&target.abs_path).is_ok() {
        return Err(OpFailure::TargetExists(target.rel_path.clone()));
    }
    if let Some(parent) = target.abs_path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    // create_new closes the gap between the existence check and the write.
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&target.abs_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(OpFailure::TargetExists(target.rel_path.clone()));
        }
        Err(source) => return Err(io_err(&target.abs_path)(source)),
    };
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_data())
        .map_err(io_err(&target.abs_path))?;

    Ok((
        OpOutcome::Created {
            bytes: content.len() as u64,
            lines: count_lines(content),
        },
        Some(WriteItem {
            rel_path: target.rel_path.clone(),
            before: String::new(),
            after: content.to_string(),
        }),
    ))
}

fn patch_file(target: &SafePath, patch: &str) -> Result<(OpOutcome, Option<WriteItem>), OpFailure> {
    let meta = match fs::symlink_metadata(&target.abs_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(OpFailure::TargetMissing(target.rel_path.clone()));
        }
        Err(source) => return Err(io_err(&target.abs_path)(source)),
    };
    if !meta.is_file() {
        return Err(OpFailure::NotAFile(target.rel_path.clone()));
    }

    let body = decode_envelope(patch).ok_or_else(|| OpFailure::MalformedPatch(target.rel_path.clone()))?;
    let before = fs::read_to_string(&target.abs_path).map_err(io_err(&target.abs_path))?;
    fs::write(&target.abs_path, body).map_err(io_err(&target.abs_path))?;

    Ok((
        OpOutcome::Patched {
            bytes_before: before.len() as u64,
            bytes_after: body.len() as u64,
            lines: count_lines(body),
        },
        Some(WriteItem {
            rel_path: target.rel_path.clone(),
            before,
            after: body.to_string(),
        }),
    ))
}
