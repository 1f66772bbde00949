use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::sync::Arc;
use tracing::error;

use crate::custom_commands::filter::{filter_candidates, resolve};
use crate::custom_commands::matcher::{MatchOutcome, match_reaction};
use crate::custom_commands::{
    CcEngine, CommandStore, TemplateContext, Trigger, TriggerCategory, TriggerData,
};
use crate::error::CcError;

#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub added: bool,
}

/// Run every reaction command a reaction fires; returns how many ran
pub async fn handle_reaction(engine: &Arc<CcEngine>, event: ReactionEvent) -> Result<usize, CcError> {
    if event.user_id == engine.bot_id() {
        return Ok(0);
    }

    let commands = engine
        .store()
        .commands_by_category(event.guild_id, TriggerCategory::Reaction)
        .await?;
    if commands.is_empty() {
        return Ok(0);
    }

    let channel = engine
        .state()
        .channel(event.guild_id, event.channel_id)
        .ok_or(CcError::UnknownChannel)?;
    let member = engine.state().member(event.guild_id, event.user_id).await?;
    if member.bot {
        return Ok(0);
    }

    let matched = filter_candidates(&commands, &channel, Some(&member.roles), |cc| match cc.trigger {
        Trigger::Reaction(mode) if match_reaction(mode, event.added) => Some(MatchOutcome {
            stripped: String::new(),
            args: Vec::new(),
        }),
        _ => None,
    });
    let candidates = resolve(matched, engine.limits().exec_limit(event.guild_id));

    let ran = candidates.len();
    for triggered in candidates {
        let data = TriggerData::Reaction {
            message_id: event.message_id,
            emoji: event.emoji.clone(),
            added: event.added,
        };
        let ctx = TemplateContext::new(&triggered.cc, channel.clone(), data).with_member(Some(member.clone()));

        if let Err(e) = engine.execute_command(&triggered.cc, ctx).await {
            error!(
                "Failed to run reaction custom command #{} in guild {}: {}",
                triggered.cc.local_id, event.guild_id, e
            );
        }
    }
    Ok(ran)
}
