// ask.rs — `anzen ask`: a free-text question for the chat engine.

use super::Context;

pub fn execute(ctx: &Context, text: &str) -> anyhow::Result<()> {
    let runtime = ctx.open()?;
    println!("{}", runtime.answer_chat(ctx.user_id, text)?);
    Ok(())
}
