use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use poise::serenity_prelude::GuildId;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{CustomCommand, TriggerCategory};
use crate::error::CcError;

/// Read access to command definitions plus the few fields this engine writes back
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Commands of a guild whose trigger kind is in `category`, groups attached
    async fn commands_by_category(
        &self,
        guild_id: GuildId,
        category: TriggerCategory,
    ) -> Result<Vec<Arc<CustomCommand>>, CcError>;

    async fn command(&self, guild_id: GuildId, local_id: i64) -> Result<Option<CustomCommand>, CcError>;

    async fn command_prefix(&self, guild_id: GuildId) -> Result<Option<String>, CcError>;

    /// Store the next run; `last_run` is only written when given
    async fn update_run_times(
        &self,
        guild_id: GuildId,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CcError>;

    /// Bump the run counter and record the error of this run, if any
    async fn record_run(&self, guild_id: GuildId, local_id: i64, error: Option<&str>) -> Result<(), CcError>;

    /// Enabled timed commands with no next run or one older than `before`
    async fn overdue_timed_commands(&self, before: DateTime<Utc>) -> Result<Vec<CustomCommand>, CcError>;
}

struct CachedList {
    fetched_at: Instant,
    commands: Vec<Arc<CustomCommand>>,
}

/// Per-guild, per-category TTL cache in front of a store
pub struct CachedCommandStore {
    inner: Arc<dyn CommandStore>,
    ttl: Duration,
    lists: DashMap<(GuildId, TriggerCategory), CachedList>,
    prefixes: DashMap<GuildId, (Instant, Option<String>)>,
}

impl CachedCommandStore {
    pub fn new(inner: Arc<dyn CommandStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            lists: DashMap::new(),
            prefixes: DashMap::new(),
        }
    }

    /// Forget everything cached for a guild
    pub fn invalidate(&self, guild_id: GuildId) {
        self.lists.retain(|(g, _), _| *g != guild_id);
        self.prefixes.remove(&guild_id);
    }
}

#[async_trait]
impl CommandStore for CachedCommandStore {
    async fn commands_by_category(
        &self,
        guild_id: GuildId,
        category: TriggerCategory,
    ) -> Result<Vec<Arc<CustomCommand>>, CcError> {
        if let Some(entry) = self.lists.get(&(guild_id, category)) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.commands.clone());
            }
        }

        let commands = self.inner.commands_by_category(guild_id, category).await?;
        self.lists.insert(
            (guild_id, category),
            CachedList {
                fetched_at: Instant::now(),
                commands: commands.clone(),
            },
        );
        Ok(commands)
    }

    async fn command(&self, guild_id: GuildId, local_id: i64) -> Result<Option<CustomCommand>, CcError> {
        self.inner.command(guild_id, local_id).await
    }

    async fn command_prefix(&self, guild_id: GuildId) -> Result<Option<String>, CcError> {
        if let Some(entry) = self.prefixes.get(&guild_id) {
            if entry.0.elapsed() < self.ttl {
                return Ok(entry.1.clone());
            }
        }

        let prefix = self.inner.command_prefix(guild_id).await?;
        self.prefixes.insert(guild_id, (Instant::now(), prefix.clone()));
        Ok(prefix)
    }

    async fn update_run_times(
        &self,
        guild_id: GuildId,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CcError> {
        self.inner
            .update_run_times(guild_id, local_id, last_run, next_run)
            .await
    }

    async fn record_run(&self, guild_id: GuildId, local_id: i64, error: Option<&str>) -> Result<(), CcError> {
        self.inner.record_run(guild_id, local_id, error).await
    }

    async fn overdue_timed_commands(&self, before: DateTime<Utc>) -> Result<Vec<CustomCommand>, CcError> {
        self.inner.overdue_timed_commands(before).await
    }
}
