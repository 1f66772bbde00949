/// Event entry points: gateway events in, custom command runs out
mod changes;
mod interaction;
mod message;
mod reaction;
mod role;
mod timed;

use poise::serenity_prelude::{
    self as serenity, ActionRowComponent, ComponentInteraction, ComponentInteractionDataKind, FullEvent,
    GuildId, Message, ModalInteraction, Reaction, UserId,
};
use ::serenity::model::guild::audit_log::{Action, AuditLogEntry, Change, MemberAction};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::custom_commands::{ComponentKind, InteractionHandle, MemberInfo, MessageSnapshot};
use crate::models::Data;
use crate::services::member_info;

// Re-export main handler functions
pub use changes::start_change_listener;
pub use interaction::{InteractionEvent, InteractionSource, handle_interaction};
pub use message::{MessageEvent, diagnose_message, handle_message};
pub use reaction::{ReactionEvent, handle_reaction};
pub use role::{RoleChangeEvent, handle_role_change};
pub use timed::register_handlers;

/// Route one gateway event to its entry point
pub async fn handle_event(event: &FullEvent, data: &Data) {
    let engine = &data.engine;
    let result = match event {
        FullEvent::Message { new_message } => match message_event(new_message, false) {
            Some(ev) => handle_message(engine, ev).await,
            None => return,
        },
        FullEvent::MessageUpdate { new: Some(msg), .. } => match message_event(msg, true) {
            Some(ev) => handle_message(engine, ev).await,
            None => return,
        },
        FullEvent::InteractionCreate { interaction } => {
            let ev = match interaction {
                serenity::Interaction::Component(component) => component_event(component),
                serenity::Interaction::Modal(modal) => modal_event(modal),
                _ => None,
            };
            match ev {
                Some(ev) => handle_interaction(engine, ev).await,
                None => return,
            }
        }
        FullEvent::ReactionAdd { add_reaction } => match reaction_event(add_reaction, true) {
            Some(ev) => handle_reaction(engine, ev).await,
            None => return,
        },
        FullEvent::ReactionRemove { removed_reaction } => match reaction_event(removed_reaction, false) {
            Some(ev) => handle_reaction(engine, ev).await,
            None => return,
        },
        FullEvent::GuildAuditLogEntryCreate { entry, guild_id } => match role_change_event(entry, *guild_id) {
            Some(ev) => handle_role_change(engine, ev).await,
            None => return,
        },
        FullEvent::GuildCreate { guild, .. } => {
            data.state.set_unavailable(guild.id, false);
            return;
        }
        FullEvent::GuildDelete { incomplete, .. } => {
            data.state.set_unavailable(incomplete.id, incomplete.unavailable);
            return;
        }
        _ => return,
    };

    match result {
        Ok(0) => {}
        Ok(ran) => debug!("Event ran {} custom command(s)", ran),
        Err(e) => warn!("Failed to handle custom command event: {}", e),
    }
}

fn author_info(msg: &Message) -> MemberInfo {
    let member = msg.member.as_ref();
    MemberInfo {
        user_id: msg.author.id,
        display_name: member
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.name.clone()),
        roles: member.map(|m| m.roles.clone()).unwrap_or_default(),
        bot: msg.author.bot,
    }
}

fn snapshot(msg: &Message) -> MessageSnapshot {
    let mut snapshot = MessageSnapshot::new(msg.id, msg.channel_id, msg.author.id, msg.content.clone());
    snapshot.forwarded = forwarded_contents(msg);
    snapshot
}

/// Text of every message forwarded inside `msg`
fn forwarded_contents(msg: &Message) -> Vec<String> {
    msg.message_snapshots
        .iter()
        .map(|forwarded| forwarded.content.clone())
        .filter(|content| !content.is_empty())
        .collect()
}

fn message_event(msg: &Message, is_edit: bool) -> Option<MessageEvent> {
    Some(MessageEvent {
        guild_id: msg.guild_id?,
        channel_id: msg.channel_id,
        author: author_info(msg),
        message: snapshot(msg),
        is_edit,
    })
}

fn component_event(component: &ComponentInteraction) -> Option<InteractionEvent> {
    let (kind, values) = match &component.data.kind {
        ComponentInteractionDataKind::Button => (ComponentKind::Button, Vec::new()),
        ComponentInteractionDataKind::StringSelect { values } => (ComponentKind::StringSelect, values.clone()),
        ComponentInteractionDataKind::UserSelect { values } => {
            (ComponentKind::UserSelect, values.iter().map(ToString::to_string).collect())
        }
        ComponentInteractionDataKind::RoleSelect { values } => {
            (ComponentKind::RoleSelect, values.iter().map(ToString::to_string).collect())
        }
        ComponentInteractionDataKind::MentionableSelect { values } => {
            (ComponentKind::MentionableSelect, values.iter().map(ToString::to_string).collect())
        }
        ComponentInteractionDataKind::ChannelSelect { values } => {
            (ComponentKind::ChannelSelect, values.iter().map(ToString::to_string).collect())
        }
        _ => return None,
    };

    Some(InteractionEvent {
        guild_id: component.guild_id?,
        channel_id: component.channel_id,
        member: member_info(component.member.as_ref()?),
        custom_id: component.data.custom_id.clone(),
        source: InteractionSource::Component(kind),
        values,
        message: Some(snapshot(&component.message)),
        interaction: Arc::new(InteractionHandle::new(component.id, component.token.clone())),
    })
}

fn modal_event(modal: &ModalInteraction) -> Option<InteractionEvent> {
    let values = modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .filter_map(|component| match component {
            ActionRowComponent::InputText(input) => Some(input.value.clone().unwrap_or_default()),
            _ => None,
        })
        .collect();

    Some(InteractionEvent {
        guild_id: modal.guild_id?,
        channel_id: modal.channel_id,
        member: member_info(modal.member.as_ref()?),
        custom_id: modal.data.custom_id.clone(),
        source: InteractionSource::Modal,
        values,
        message: modal.message.as_deref().map(snapshot),
        interaction: Arc::new(InteractionHandle::new(modal.id, modal.token.clone())),
    })
}

fn reaction_event(reaction: &Reaction, added: bool) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        guild_id: reaction.guild_id?,
        channel_id: reaction.channel_id,
        message_id: reaction.message_id,
        user_id: reaction.user_id?,
        emoji: reaction.emoji.to_string(),
        added,
    })
}

fn role_change_event(entry: &AuditLogEntry, guild_id: GuildId) -> Option<RoleChangeEvent> {
    if !matches!(entry.action, Action::Member(MemberAction::RoleUpdate)) {
        return None;
    }
    let target = UserId::new(entry.target_id?.get());

    let mut added = Vec::new();
    let mut removed = Vec::new();
    for change in entry.changes.iter().flatten() {
        match change {
            Change::RolesAdded { new: Some(roles), .. } => added.extend(roles.iter().map(|r| r.id)),
            Change::RolesRemove { new: Some(roles), .. } => removed.extend(roles.iter().map(|r| r.id)),
            _ => {}
        }
    }
    if added.is_empty() && removed.is_empty() {
        return None;
    }

    Some(RoleChangeEvent {
        guild_id,
        target,
        moderator: Some(entry.user_id),
        added,
        removed,
    })
}
