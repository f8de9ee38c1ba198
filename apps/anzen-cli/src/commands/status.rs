// status.rs — Read-only subcommands: status, logs, list, export.

use anzen_runtime::{PENDING_PLANS_LIMIT, RECENT_PLANS_LIMIT};

use super::Context;

pub fn execute(ctx: &Context, plan_id: Option<&str>) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    match plan_id {
        Some(plan_id) => {
            let status = runtime.get_status(ctx.user_id, plan_id)?;
            println!("{} {}", plan_id, status);
        }
        None => {
            let status = runtime.get_runtime_status(ctx.user_id)?;
            println!("Instance: {}", status.instance_id);
            println!("Engine:   {}", status.engine_mode);
            println!("Policy:   {}", status.policy_id);
        }
    }
    Ok(())
}

pub fn logs(ctx: &Context, plan_id: &str) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    let view = runtime.get_logs(ctx.user_id, plan_id)?;
    println!("Plan:   {}", view.plan_id);
    println!("Status: {}", view.final_status);
    println!("Diff:   {}", view.diff_path.as_deref().unwrap_or("(no write ops)"));
    println!("Audit:  {}", view.jsonl_path);
    println!("Head:   {}", view.chain_head_hash);
    Ok(())
}

pub fn list(ctx: &Context, pending: bool, limit: Option<usize>) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    let plans = if pending {
        runtime.list_pending_plans(ctx.user_id, limit.unwrap_or(PENDING_PLANS_LIMIT))?
    } else {
        runtime.list_recent_plans(ctx.user_id, limit.unwrap_or(RECENT_PLANS_LIMIT))?
    };

    if plans.is_empty() {
        println!("No plans.");
        return Ok(());
    }

    println!(
        "{:<28} {:<12} {:<18} {:<10} CREATED",
        "PLAN", "TOKEN", "STATUS", "RISK"
    );
    println!("{}", "-".repeat(96));
    for plan in &plans {
        println!(
            "{:<28} {:<12} {:<18} {:<10} {}",
            plan.plan_id,
            plan.short_token,
            plan.status.as_str(),
            format!("{}({})", plan.risk_level, plan.risk_score),
            plan.created_at,
        );
    }
    Ok(())
}

pub fn export(ctx: &Context, plan_id: &str) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    println!("{}", runtime.export_plan_json(ctx.user_id, plan_id)?);
    Ok(())
}
