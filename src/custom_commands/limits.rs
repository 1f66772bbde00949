use poise::serenity_prelude::GuildId;
use std::collections::HashSet;
use std::time::Duration;

use crate::constants::{
    EXEC_LIMIT, EXEC_LIMIT_PREMIUM, MAX_CANCEL_CALLS, MAX_CANCEL_CALLS_PREMIUM, MAX_RUN_CALLS,
    MAX_RUN_CALLS_PREMIUM, ROLE_COOLDOWN_SECS, ROLE_COOLDOWN_SECS_PREMIUM,
};

/// Per-guild limits, raised for premium guilds
#[derive(Debug, Clone, Default)]
pub struct Limits {
    premium_guilds: HashSet<GuildId>,
}

impl Limits {
    pub fn new(premium_guilds: HashSet<GuildId>) -> Self {
        Self { premium_guilds }
    }

    pub fn is_premium(&self, guild_id: GuildId) -> bool {
        self.premium_guilds.contains(&guild_id)
    }

    /// Commands that may run from one event
    pub fn exec_limit(&self, guild_id: GuildId) -> usize {
        if self.is_premium(guild_id) {
            EXEC_LIMIT_PREMIUM
        } else {
            EXEC_LIMIT
        }
    }

    pub fn role_cooldown(&self, guild_id: GuildId) -> Duration {
        let secs = if self.is_premium(guild_id) {
            ROLE_COOLDOWN_SECS_PREMIUM
        } else {
            ROLE_COOLDOWN_SECS
        };
        Duration::from_secs(secs)
    }

    /// Nested or scheduled runs one execution may request
    pub fn run_calls(&self, guild_id: GuildId) -> u32 {
        if self.is_premium(guild_id) {
            MAX_RUN_CALLS_PREMIUM
        } else {
            MAX_RUN_CALLS
        }
    }

    pub fn cancel_calls(&self, guild_id: GuildId) -> u32 {
        if self.is_premium(guild_id) {
            MAX_CANCEL_CALLS_PREMIUM
        } else {
            MAX_CANCEL_CALLS
        }
    }
}
