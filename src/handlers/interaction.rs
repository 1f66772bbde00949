use poise::serenity_prelude::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::constants::COMPONENT_ID_PREFIX;
use crate::custom_commands::filter::{filter_candidates, resolve};
use crate::custom_commands::matcher::match_text;
use crate::custom_commands::{
    CcEngine, CommandStore, ComponentKind, InteractionDeferMode, InteractionHandle,
    MemberInfo, MessageSnapshot, TemplateContext, Trigger, TriggerCategory, TriggerData, TriggeredCc,
};
use crate::error::CcError;

/// What was submitted: a message component or a modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionSource {
    Component(ComponentKind),
    Modal,
}

/// A component click/selection or modal submission
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub member: MemberInfo,
    pub custom_id: String,
    pub source: InteractionSource,
    /// Selected values or modal field values
    pub values: Vec<String>,
    pub message: Option<MessageSnapshot>,
    pub interaction: Arc<InteractionHandle>,
}

/// The custom id with the namespace removed, or `None` when it is not ours
pub fn strip_custom_id(custom_id: &str) -> Option<&str> {
    custom_id.strip_prefix(COMPONENT_ID_PREFIX)
}

async fn interaction_candidates(
    engine: &CcEngine,
    event: &InteractionEvent,
    stripped_id: &str,
) -> Result<Vec<TriggeredCc>, CcError> {
    let channel = engine
        .state()
        .channel(event.guild_id, event.channel_id)
        .ok_or(CcError::UnknownChannel)?;

    let commands = engine
        .store()
        .commands_by_category(event.guild_id, TriggerCategory::Interaction)
        .await?;

    let matched = filter_candidates(&commands, &channel, Some(&event.member.roles), |cc| {
        let wanted = match (&cc.trigger, &event.source) {
            (Trigger::Component(_), InteractionSource::Component(_)) => true,
            (Trigger::Modal(_), InteractionSource::Modal) => true,
            _ => false,
        };
        if !wanted {
            return None;
        }
        match_text(&cc.trigger, stripped_id, "", engine.bot_id(), engine.regexes())
    });

    Ok(resolve(matched, engine.limits().exec_limit(event.guild_id)))
}

/// Run every command an interaction fires; returns how many ran
pub async fn handle_interaction(engine: &Arc<CcEngine>, event: InteractionEvent) -> Result<usize, CcError> {
    let Some(stripped_id) = strip_custom_id(&event.custom_id) else {
        return Ok(0);
    };

    let candidates = interaction_candidates(engine, &event, stripped_id).await?;
    let Some(first) = candidates.first() else {
        return Ok(0);
    };

    let defer_mode = first.cc.defer_mode;
    if defer_mode != InteractionDeferMode::None && event.interaction.claim_response() {
        engine
            .sink
            .defer_interaction(&event.interaction, defer_mode)
            .await?;
    }

    let channel = engine
        .state()
        .channel(event.guild_id, event.channel_id)
        .ok_or(CcError::UnknownChannel)?;

    debug!(
        "Interaction {} in guild {} fired {} custom command(s)",
        event.custom_id,
        event.guild_id,
        candidates.len()
    );

    let ran = candidates.len();
    for triggered in candidates {
        let data = match &event.source {
            InteractionSource::Component(kind) => TriggerData::Component {
                custom_id: event.custom_id.clone(),
                stripped_id: stripped_id.to_string(),
                kind: *kind,
                values: event.values.clone(),
                args: triggered.args,
            },
            InteractionSource::Modal => TriggerData::Modal {
                custom_id: event.custom_id.clone(),
                stripped_id: stripped_id.to_string(),
                values: event.values.clone(),
                args: triggered.args,
            },
        };
        let ctx = TemplateContext::new(&triggered.cc, channel.clone(), data)
            .with_member(Some(event.member.clone()))
            .with_message(event.message.clone())
            .with_interaction(Some(Arc::clone(&event.interaction)));

        if let Err(e) = engine.execute_command(&triggered.cc, ctx).await {
            error!(
                "Failed to run custom command #{} for interaction in guild {}: {}",
                triggered.cc.local_id, event.guild_id, e
            );
        }
    }
    Ok(ran)
}
