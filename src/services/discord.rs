use async_trait::async_trait;
use dashmap::DashSet;
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, CreateMessage, GuildChannel, GuildId, HttpError, Member, RoleId,
    UserId,
};
use std::sync::Arc;

use crate::custom_commands::{
    ChannelInfo, GuildPresence, GuildStateSource, InteractionDeferMode, InteractionHandle, MemberInfo,
    ResponseSink,
};
use crate::error::CcError;

fn is_thread(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
    )
}

fn channel_info(channel: &GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: channel.id,
        guild_id: channel.guild_id,
        name: channel.name.clone(),
        parent_id: channel.parent_id,
        is_thread: is_thread(channel.kind),
    }
}

pub fn member_info(member: &Member) -> MemberInfo {
    MemberInfo {
        user_id: member.user.id,
        display_name: member.display_name().to_string(),
        roles: member.roles.clone(),
        bot: member.user.bot,
    }
}

/// Guild state read from the gateway cache, falling back to HTTP for members
pub struct DiscordState {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    unavailable: DashSet<GuildId>,
}

impl DiscordState {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self {
            http,
            cache,
            unavailable: DashSet::new(),
        }
    }

    /// Track guild outages reported by the gateway
    pub fn set_unavailable(&self, guild_id: GuildId, unavailable: bool) {
        if unavailable {
            self.unavailable.insert(guild_id);
        } else {
            self.unavailable.remove(&guild_id);
        }
    }
}

#[async_trait]
impl GuildStateSource for DiscordState {
    fn guild_presence(&self, guild_id: GuildId) -> GuildPresence {
        if self.unavailable.contains(&guild_id) {
            return GuildPresence::Unavailable;
        }
        match self.cache.guild(guild_id) {
            Some(_) => GuildPresence::Available,
            None => GuildPresence::Missing,
        }
    }

    fn channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<ChannelInfo> {
        let guild = self.cache.guild(guild_id)?;
        guild
            .channels
            .get(&channel_id)
            .or_else(|| guild.threads.iter().find(|t| t.id == channel_id))
            .map(channel_info)
    }

    fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> bool {
        self.cache
            .guild(guild_id)
            .is_some_and(|guild| guild.roles.contains_key(&role_id))
    }

    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberInfo, CcError> {
        let member = guild_id
            .member((&self.cache, self.http.as_ref()), user_id)
            .await?;
        Ok(member_info(&member))
    }

    async fn bot_on_guild(&self, guild_id: GuildId) -> Result<bool, CcError> {
        match self.http.get_guild(guild_id).await {
            Ok(_) => Ok(true),
            Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response)))
                if matches!(response.status_code.as_u16(), 403 | 404) =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Sends command output through the Discord HTTP API
pub struct DiscordSink {
    http: Arc<serenity::Http>,
}

impl DiscordSink {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ResponseSink for DiscordSink {
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), CcError> {
        channel_id
            .send_message(&self.http, CreateMessage::new().content(content))
            .await?;
        Ok(())
    }

    async fn respond_interaction(
        &self,
        interaction: &InteractionHandle,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), CcError> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral),
        );
        self.http
            .create_interaction_response(interaction.id, &interaction.token, &response, Vec::new())
            .await?;
        Ok(())
    }

    async fn followup_interaction(
        &self,
        interaction: &InteractionHandle,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), CcError> {
        let followup = CreateInteractionResponseFollowup::new()
            .content(content)
            .ephemeral(ephemeral);
        self.http
            .create_followup_message(&interaction.token, &followup, Vec::new())
            .await?;
        Ok(())
    }

    async fn defer_interaction(
        &self,
        interaction: &InteractionHandle,
        mode: InteractionDeferMode,
    ) -> Result<(), CcError> {
        let response = match mode {
            InteractionDeferMode::None => return Ok(()),
            InteractionDeferMode::Message => {
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new())
            }
            InteractionDeferMode::EphemeralMessage => {
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true))
            }
            InteractionDeferMode::Update => CreateInteractionResponse::Acknowledge,
        };
        self.http
            .create_interaction_response(interaction.id, &interaction.token, &response, Vec::new())
            .await?;
        Ok(())
    }
}
