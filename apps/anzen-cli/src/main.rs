//! # anzen-cli
//!
//! Command-line front-end for the Anzen plan gate.
//!
//! Stands in for the chat layer: every subcommand maps onto one runtime
//! operation, run as the user given by `--user`.
//! - `anzen plan <text>` — draft and persist a plan awaiting approval
//! - `anzen approve <plan_id> <token>` — confirm and execute
//! - `anzen reject <plan_id>` — discard a pending plan
//! - `anzen status [plan_id]` / `anzen logs <plan_id>` — inspect
//! - `anzen list [--pending]` / `anzen export <plan_id>` — browse plans
//! - `anzen audit verify/tail <plan_id>` — inspect the hash chain

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Anzen: policy-gated filesystem plans with human approval.
#[derive(Parser)]
#[command(name = "anzen", version, about)]
struct Cli {
    /// Workspace root plans operate in (defaults to current directory).
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Policy file (defaults to <workspace>/config/policy.yaml).
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Acting user id.
    #[arg(long, global = true, default_value_t = 1)]
    user: i64,

    /// Channel id recorded as the plan's origin.
    #[arg(long, global = true, default_value_t = 1)]
    channel: i64,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draft a plan from a request and hold it for approval.
    Plan {
        /// What you want done, in plain words.
        text: String,
        /// Use this JSON draft instead of asking the configured engine.
        #[arg(long)]
        draft: Option<PathBuf>,
    },
    /// Approve a pending plan with its short token and execute it.
    Approve { plan_id: String, token: String },
    /// Reject a pending plan.
    Reject { plan_id: String },
    /// Show a plan's status, or the runtime's when no plan is given.
    Status { plan_id: Option<String> },
    /// Show where a finished plan's diff and audit log are.
    Logs { plan_id: String },
    /// List your recent plans.
    List {
        /// Only plans still awaiting approval.
        #[arg(long)]
        pending: bool,
        /// How many to show.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print a plan as JSON.
    Export { plan_id: String },
    /// Ask the chat engine a free-text question.
    Ask { text: String },
    /// Inspect a plan's audit chain.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays clean.
    let filter = EnvFilter::from_default_env()
        .add_directive("anzen_runtime=info".parse()?)
        .add_directive("anzen_cli=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let ctx = commands::Context::new(cli.workspace, cli.policy, cli.user, cli.channel)?;

    match &cli.command {
        Commands::Plan { text, draft } => commands::plan::execute(&ctx, text, draft.as_deref()),
        Commands::Approve { plan_id, token } => commands::approve::execute(&ctx, plan_id, token),
        Commands::Reject { plan_id } => commands::approve::reject(&ctx, plan_id),
        Commands::Status { plan_id } => commands::status::execute(&ctx, plan_id.as_deref()),
        Commands::Logs { plan_id } => commands::status::logs(&ctx, plan_id),
        Commands::List { pending, limit } => commands::status::list(&ctx, *pending, *limit),
        Commands::Export { plan_id } => commands::status::export(&ctx, plan_id),
        Commands::Ask { text } => commands::ask::execute(&ctx, text),
        Commands::Audit { command } => commands::audit::execute(command, &ctx),
    }
}
