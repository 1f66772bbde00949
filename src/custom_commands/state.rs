use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};

use super::types::MemberInfo;
use crate::error::CcError;

/// How much the local state knows about a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuildPresence {
    Available,
    /// Known but currently in an outage
    Unavailable,
    /// Not cached at all
    Missing,
}

/// A guild channel as seen by scope checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    /// Parent channel for threads
    pub parent_id: Option<ChannelId>,
    pub is_thread: bool,
}

impl ChannelInfo {
    pub fn new(id: ChannelId, guild_id: GuildId) -> Self {
        Self {
            id,
            guild_id,
            name: String::new(),
            parent_id: None,
            is_thread: false,
        }
    }

    /// Threads are scoped by their parent channel
    pub fn scope_id(&self) -> ChannelId {
        match (self.is_thread, self.parent_id) {
            (true, Some(parent)) => parent,
            _ => self.id,
        }
    }
}

/// Read-mostly guild state
#[async_trait]
pub trait GuildStateSource: Send + Sync {
    fn guild_presence(&self, guild_id: GuildId) -> GuildPresence;

    fn channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<ChannelInfo>;

    fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> bool;

    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo, CcError>;

    /// Authoritative check that the bot is still in the guild
    async fn bot_on_guild(&self, guild_id: GuildId) -> Result<bool, CcError>;
}
