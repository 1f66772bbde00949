use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::GuildId;

use crate::error::CcError;

/// A due event handed to a handler
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub id: i64,
    pub guild_id: GuildId,
    pub name: String,
    pub triggers_at: DateTime<Utc>,
    pub data: serde_json::Value,
    pub attempts: i32,
    /// Claim generation, guards against marking a replaced row
    pub generation: i64,
}

/// An event to persist
#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduledEvent {
    pub name: &'static str,
    pub guild_id: GuildId,
    pub triggers_at: DateTime<Utc>,
    pub data: serde_json::Value,
    pub cmd_id: Option<i64>,
    pub unique_key: Option<String>,
}

/// Matches pending (unprocessed) events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFilter {
    pub name: &'static str,
    pub guild_id: GuildId,
    pub cmd_id: i64,
    /// When set only events with this key match
    pub unique_key: Option<String>,
}

impl PendingFilter {
    pub fn matches(&self, event: &NewScheduledEvent) -> bool {
        event.name == self.name
            && event.guild_id == self.guild_id
            && event.cmd_id == Some(self.cmd_id)
            && (self.unique_key.is_none() || event.unique_key == self.unique_key)
    }
}

/// Durable one-shot event store
#[async_trait]
pub trait EventScheduler: Send + Sync {
    async fn schedule(&self, event: NewScheduledEvent) -> Result<(), CcError>;

    /// Insert, atomically replacing any pending event with the same (guild, name, cmd, key)
    async fn schedule_replacing(&self, event: NewScheduledEvent) -> Result<(), CcError>;

    /// Delete every pending event matching the filter, returning how many went
    async fn delete_pending(&self, filter: &PendingFilter) -> Result<u64, CcError>;
}

/// What the worker should do with a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueOutcome {
    Done,
    Retry,
}

#[async_trait]
pub trait ScheduledEventHandler: Send + Sync {
    async fn on_due(&self, event: &ScheduledEvent) -> Result<DueOutcome, CcError>;
}
