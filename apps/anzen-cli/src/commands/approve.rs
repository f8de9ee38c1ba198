// approve.rs — `anzen approve` and `anzen reject`.

use anzen_runtime::RuntimeError;

use super::Context;

pub fn execute(ctx: &Context, plan_id: &str, token: &str) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    match runtime.approve_and_execute(ctx.user_id, plan_id, token) {
        Ok(result) => {
            println!("Plan {} {} in {} ms", result.plan_id, result.status, result.duration_ms);
            for op in &result.op_summaries {
                println!("  {}", op.describe());
            }
            match &result.diff_artifact {
                Some(artifact) => println!(
                    "  Diff: {} ({} changed line(s))",
                    artifact.path.display(),
                    artifact.total_changed_lines()
                ),
                None => println!("  Diff: (no write ops)"),
            }
            Ok(())
        }
        Err(err @ RuntimeError::Execution(_)) => {
            tracing::error!(plan_id = %plan_id, error = %err, "plan execution failed");
            println!("Plan {} FAILED.", plan_id);
            println!("Operations applied before the failure were not rolled back.");
            println!("See: anzen logs {}", plan_id);
            Err(err.into())
        }
        Err(err) => {
            tracing::warn!(plan_id = %plan_id, error = %err, "approve failed");
            Err(err.into())
        }
    }
}

pub fn reject(ctx: &Context, plan_id: &str) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    let status = runtime.reject_plan(ctx.user_id, plan_id)?;
    println!("Plan {} {}", plan_id, status);
    Ok(())
}
