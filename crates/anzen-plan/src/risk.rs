// risk.rs — Deterministic risk scoring for plan operations.
//
// The rubric is additive: a fixed weight per op type, a volume weight for
// write ops (one step per full 20 lines, capped per op), and a penalty for
// every distinct path beyond the first (capped per plan). The total
// saturates at 100. No I/O happens here, so the same ops and weights always
// give the same report, reasons included.

use std::collections::BTreeSet;

use anzen_policy::{PolicyConfig, RiskLevel, RiskScoringConfig};

use crate::model::{OpType, PlanOp, RiskReport};

const MAX_SCORE: u32 = 100;
const LINE_STEP: u32 = 20;
const MAX_LINE_WEIGHT_PER_OP: u32 = 20;
const MAX_MULTI_FILE_PENALTY: u32 = 18;

/// Scores op lists against a fixed rubric and block list.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    scoring: RiskScoringConfig,
    block_levels: Vec<RiskLevel>,
}

impl RiskEngine {
    pub fn new(scoring: RiskScoringConfig, block_levels: Vec<RiskLevel>) -> Self {
        Self {
            scoring,
            block_levels,
        }
    }

    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self::new(policy.risk.scoring.clone(), policy.risk.block_levels.clone())
    }

    /// Score `ops` in order. Reasons are emitted in the order the rubric
    /// visits them.
    pub fn evaluate(&self, ops: &[PlanOp]) -> RiskReport {
        let mut score: u32 = 0;
        let mut reasons = Vec::new();

        for op in ops {
            let base = self.type_weight(op.op_type);
            score = score.saturating_add(base);
            reasons.push(format!("{} +{}", op.op_type, base));

            match op.op_type {
                OpType::PatchFile => {
                    let lines = changed_line_count(op.patch.as_deref().unwrap_or(""));
                    let weight = self.line_weight(lines);
                    if weight > 0 {
                        score = score.saturating_add(weight);
                        reasons.push(format!("changed_lines({}) +{}", lines, weight));
                    }
                }
                OpType::CreateFile => {
                    let lines = op
                        .content
                        .as_deref()
                        .map(|c| c.lines().count() as u32)
                        .unwrap_or(0)
                        .max(1);
                    let weight = self.line_weight(lines);
                    if weight > 0 {
                        score = score.saturating_add(weight);
                        reasons.push(format!("new_lines({}) +{}", lines, weight));
                    }
                }
                OpType::ListDir | OpType::ReadFile => {}
            }
        }

        let distinct: BTreeSet<&str> = ops.iter().map(|op| op.path.as_str()).collect();
        if distinct.len() > 1 {
            let extra = (distinct.len() - 1) as u32;
            let penalty = extra
                .saturating_mul(self.scoring.per_extra_file)
                .min(MAX_MULTI_FILE_PENALTY);
            score = score.saturating_add(penalty);
            reasons.push(format!("multi_file({}) +{}", distinct.len(), penalty));
        }

        let score = score.min(MAX_SCORE);
        let level = RiskLevel::from_score(score);
        let blocked = self.block_levels.contains(&level);
        if blocked {
            tracing::debug!(score, level = %level, "risk level is on the block list");
        }

        RiskReport {
            score,
            level,
            reasons,
            blocked,
        }
    }

    fn type_weight(&self, op_type: OpType) -> u32 {
        match op_type {
            OpType::ListDir => self.scoring.list_dir,
            OpType::ReadFile => self.scoring.read_file,
            OpType::CreateFile => self.scoring.create_file,
            OpType::PatchFile => self.scoring.patch_file,
        }
    }

    fn line_weight(&self, lines: u32) -> u32 {
        (lines / LINE_STEP)
            .saturating_mul(self.scoring.per_20_changed_lines)
            .min(MAX_LINE_WEIGHT_PER_OP)
    }
}

/// Lines of the raw payload that start with `+` or `-`.
///
/// The payload is scored as written, envelope markers included. A plain
/// replacement body therefore adds no volume weight unless its own lines
/// begin with those characters.
fn changed_line_count(patch: &str) -> u32 {
    patch
        .lines()
        .filter(|line| line.starts_with('+') || line.starts_with('-'))
        .count() as u32
}
