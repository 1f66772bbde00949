use poise::serenity_prelude::{GuildId, RoleId, UserId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::custom_commands::filter::{resolve, runs_for_role, runs_in_channel};
use crate::custom_commands::matcher::match_role_change;
use crate::custom_commands::{
    CcEngine, ChannelInfo, CommandStore, CustomCommand, MemberInfo, RoleCooldownKey,
    TemplateContext, Trigger, TriggerCategory, TriggerData, TriggeredCc,
};
use crate::error::CcError;

/// Roles added to and removed from one member, as read from an audit log entry
#[derive(Debug, Clone)]
pub struct RoleChangeEvent {
    pub guild_id: GuildId,
    pub target: UserId,
    pub moderator: Option<UserId>,
    pub added: Vec<RoleId>,
    pub removed: Vec<RoleId>,
}

impl RoleChangeEvent {
    fn deltas(&self) -> impl Iterator<Item = (RoleId, bool)> + '_ {
        self.added
            .iter()
            .map(|r| (*r, true))
            .chain(self.removed.iter().map(|r| (*r, false)))
    }
}

fn role_candidates(
    engine: &CcEngine,
    commands: &[Arc<CustomCommand>],
    guild_id: GuildId,
    role_id: RoleId,
    added: bool,
) -> Vec<(TriggeredCc, ChannelInfo)> {
    let mut matched: Vec<TriggeredCc> = commands
        .iter()
        .filter(|cc| cc.is_enabled())
        .filter(|cc| matches!(cc.trigger, Trigger::RoleChange(mode) if match_role_change(mode, added)))
        .filter(|cc| runs_for_role(cc, role_id))
        .map(|cc| TriggeredCc::new(Arc::clone(cc)))
        .collect();
    matched = resolve(matched, engine.limits().exec_limit(guild_id));

    // role-change runs post in the command's context channel
    matched
        .into_iter()
        .filter_map(|t| {
            let channel = engine.state().channel(guild_id, t.cc.context_channel?)?;
            runs_in_channel(&t.cc, &channel).then_some((t, channel))
        })
        .collect()
}

/// Run role-change commands for every role delta; returns how many ran
pub async fn handle_role_change(engine: &Arc<CcEngine>, event: RoleChangeEvent) -> Result<usize, CcError> {
    let commands = engine
        .store()
        .commands_by_category(event.guild_id, TriggerCategory::RoleChange)
        .await?;
    if commands.is_empty() {
        return Ok(0);
    }

    let member = engine.state().member(event.guild_id, event.target).await?;
    if member.bot {
        return Ok(0);
    }
    let moderator = match event.moderator {
        Some(user_id) if user_id != event.target => engine.state().member(event.guild_id, user_id).await.ok(),
        Some(_) => Some(member.clone()),
        None => None,
    };

    let mut ran = 0;
    for (role_id, added) in event.deltas() {
        if !engine.state().role_exists(event.guild_id, role_id) {
            continue;
        }

        let key = RoleCooldownKey {
            guild_id: event.guild_id,
            user_id: event.target,
            role_id,
        };
        if engine.cooldowns.is_active(key).await? {
            debug!("Role trigger {} is cooling down", key);
            continue;
        }

        let candidates = role_candidates(engine, &commands, event.guild_id, role_id, added);
        if candidates.is_empty() {
            continue;
        }
        if !engine
            .cooldowns
            .try_start(key, engine.limits().role_cooldown(event.guild_id))
            .await?
        {
            continue;
        }

        for (triggered, channel) in candidates {
            ran += 1;
            run_one(engine, &triggered, channel, &member, moderator.clone(), role_id, added).await;
        }
    }
    Ok(ran)
}

async fn run_one(
    engine: &Arc<CcEngine>,
    triggered: &TriggeredCc,
    channel: ChannelInfo,
    member: &MemberInfo,
    moderator: Option<MemberInfo>,
    role_id: RoleId,
    added: bool,
) {
    let data = TriggerData::RoleChange {
        role_id,
        added,
        moderator,
    };
    let ctx = TemplateContext::new(&triggered.cc, channel, data).with_member(Some(member.clone()));

    if let Err(e) = engine.execute_command(&triggered.cc, ctx).await {
        error!(
            "Failed to run role custom command #{} in guild {}: {}",
            triggered.cc.local_id, triggered.cc.guild_id, e
        );
    }
}
