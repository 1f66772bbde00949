use std::time::Duration;
use tracing::{error, info};

use crate::{
    constants::RUN_NOW_COOLDOWN_SECS,
    custom_commands::guards::RUN_NOW_BUCKET,
    models::{Context, Error},
    utils::messages::{format_error, format_success},
    utils::validation::{require_guild, validate_command_id},
};

/// Run a custom command right now in its context channel
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn cc_run_now(
    ctx: Context<'_>,
    #[description = "Custom command id"] id: i64,
) -> Result<(), Error> {
    let guild_id = require_guild(ctx.guild_id())?;
    let local_id = validate_command_id(id)?;
    let engine = &ctx.data().engine;

    let cooldown_key = format!("{}:{}", guild_id, ctx.author().id);
    match engine
        .kv()
        .set_if_absent(RUN_NOW_BUCKET, &cooldown_key, Duration::from_secs(RUN_NOW_COOLDOWN_SECS))
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            ctx.say(format_error("Slow down! You can run a command manually every few seconds."))
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!("Failed to check run-now cooldown: {}", e);
            ctx.say(format_error("A database error occurred. Please try again later."))
                .await?;
            return Ok(());
        }
    }

    ctx.defer().await?;

    match engine.run_now(guild_id, local_id).await {
        Ok(()) => {
            info!("Ran custom command #{} in guild {} on request", local_id, guild_id);
            ctx.say(format_success(&format!("Custom command #{} ran.", local_id)))
                .await?;
        }
        Err(e) => {
            error!(
                "Failed to run custom command #{} in guild {} on request: {}",
                local_id, guild_id, e
            );
            ctx.say(format_error(&format!("Custom command #{} failed: {}", local_id, e)))
                .await?;
        }
    }

    Ok(())
}
