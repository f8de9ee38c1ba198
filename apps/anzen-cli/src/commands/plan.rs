// plan.rs — `anzen plan`: draft a plan and hold it for approval.

use std::path::Path;

use anyhow::Context as _;

use anzen_plan::{DraftPlan, Plan, RequestedBy};
use anzen_runtime::DraftEngine;

use super::Context;

pub fn execute(ctx: &Context, text: &str, draft_file: Option<&Path>) -> anyhow::Result<()> {
    let scripted = draft_file.map(load_draft).transpose()?;
    let drafts = DraftEngine::from_config(&ctx.policy.engine, scripted)?;
    let runtime = ctx.open_with(drafts)?;

    let requested_by = RequestedBy {
        user_id: ctx.user_id,
        channel_id: ctx.channel_id,
    };
    let created = runtime.create_plan(requested_by, text)?;
    print_plan(&created.plan, &created.summary);
    Ok(())
}

pub(crate) fn load_draft(path: &Path) -> anyhow::Result<DraftPlan> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading draft {}", path.display()))?;
    DraftPlan::from_json(&raw).with_context(|| format!("parsing draft {}", path.display()))
}

fn print_plan(plan: &Plan, summary: &str) {
    println!("Plan {} created ({})", plan.plan_id, plan.status);
    if !summary.is_empty() {
        println!("  Summary: {}", summary);
    }
    println!(
        "  Risk:    {} (score {}){}",
        plan.risk.level,
        plan.risk.score,
        if plan.risk.blocked { " BLOCKED" } else { "" }
    );
    for reason in &plan.risk.reasons {
        println!("           - {}", reason);
    }
    println!("  Expires: {}", plan.expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!("  {:<6} {:<12} PATH", "OP", "TYPE");
    for op in &plan.ops {
        println!("  {:<6} {:<12} {}", op.op_id, op.op_type.as_str(), op.path);
    }
    println!();
    if plan.risk.blocked {
        println!("This plan is blocked by risk policy and cannot be approved.");
    } else {
        println!("To approve: anzen approve {} {}", plan.plan_id, plan.short_token);
    }
}
