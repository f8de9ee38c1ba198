// audit.rs — Audit subcommands: verify, tail.

use clap::Subcommand;

use anzen_audit::AuditError;
use anzen_runtime::RuntimeError;

use super::Context;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify a plan's hash chain against its store mirror.
    Verify { plan_id: String },
    /// Show a plan's most recent audit events.
    Tail {
        plan_id: String,
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, ctx: &Context) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    match cmd {
        AuditCommands::Verify { plan_id } => match runtime.verify_audit(ctx.user_id, plan_id) {
            Ok(report) => {
                println!(
                    "Audit chain verified: {} event(s), head {}{}",
                    report.events,
                    report.head,
                    if report.mirror_checked { ", store mirror agrees" } else { "" }
                );
            }
            Err(err @ RuntimeError::Audit(AuditError::IntegrityViolation { .. })) => {
                tracing::error!(plan_id = %plan_id, error = %err, "audit chain integrity violation");
                println!("INTEGRITY VIOLATION: {}", err);
                println!();
                println!("The audit log may have been tampered with.");
                anyhow::bail!("audit chain integrity check failed");
            }
            Err(err) => return Err(err.into()),
        },

        AuditCommands::Tail { plan_id, n } => {
            let events = runtime.tail_audit(ctx.user_id, plan_id, *n)?;
            if events.is_empty() {
                println!("No audit events.");
                return Ok(());
            }

            println!("{:<28} {:<20} {:<18} PAYLOAD", "TIMESTAMP", "EVENT", "STATUS");
            println!("{}", "-".repeat(96));
            for event in &events {
                println!(
                    "{:<28} {:<20} {:<18} {}",
                    event.ts,
                    event.event_type.as_str(),
                    event.status,
                    serde_json::to_string(&event.payload)?,
                );
            }
        }
    }

    Ok(())
}
