/// Custom command trigger engine
pub mod executor;
pub mod filter;
pub mod guards;
pub mod interval;
pub mod limits;
pub mod matcher;
pub mod regex_cache;
mod scheduler;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod testing;

use poise::serenity_prelude::{GuildId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::constants::{DELAYED_RUN_BURST, DELAYED_RUN_RATE_PER_SEC, REGEX_CACHE_CAPACITY, REGEX_CACHE_TTL_SECS};
use crate::schedule::EventScheduler;

pub use executor::{
    CcHost, ComponentKind, InteractionHandle, ResponseSink, TemplateContext,
    TemplateEngine, TriggerData,
};
pub use guards::{DelayedRunLimiter, KvStore, RoleCooldownKey, RoleTriggerCooldown, full_refill_after};
pub use limits::Limits;
pub use regex_cache::RegexCache;
pub use state::{ChannelInfo, GuildPresence, GuildStateSource};
pub use store::{CachedCommandStore, CommandStore};
pub use types::*;

/// Collaborators the engine is built from
pub struct EngineParts {
    pub store: Arc<dyn CommandStore>,
    pub cache_ttl: Duration,
    pub state: Arc<dyn GuildStateSource>,
    pub templates: Arc<dyn TemplateEngine>,
    pub sink: Arc<dyn ResponseSink>,
    pub scheduler: Arc<dyn EventScheduler>,
    pub kv: Arc<dyn KvStore>,
    pub limits: Limits,
    pub bot_id: UserId,
    pub default_prefix: String,
}

/// Shared state behind every entry point
pub struct CcEngine {
    pub(crate) store: CachedCommandStore,
    pub(crate) state: Arc<dyn GuildStateSource>,
    pub(crate) templates: Arc<dyn TemplateEngine>,
    pub(crate) sink: Arc<dyn ResponseSink>,
    pub(crate) scheduler: Arc<dyn EventScheduler>,
    pub(crate) kv: Arc<dyn KvStore>,
    pub(crate) cooldowns: RoleTriggerCooldown,
    pub(crate) delayed_limiter: DelayedRunLimiter,
    pub(crate) limits: Limits,
    pub(crate) regexes: RegexCache,
    pub(crate) bot_id: UserId,
    pub(crate) default_prefix: String,
}

impl CcEngine {
    pub fn new(parts: EngineParts) -> Arc<Self> {
        Arc::new(Self {
            store: CachedCommandStore::new(parts.store, parts.cache_ttl),
            cooldowns: RoleTriggerCooldown::new(Arc::clone(&parts.kv)),
            delayed_limiter: DelayedRunLimiter::new(
                Arc::clone(&parts.kv),
                DELAYED_RUN_RATE_PER_SEC,
                DELAYED_RUN_BURST,
            ),
            state: parts.state,
            templates: parts.templates,
            sink: parts.sink,
            scheduler: parts.scheduler,
            kv: parts.kv,
            limits: parts.limits,
            regexes: RegexCache::new(Duration::from_secs(REGEX_CACHE_TTL_SECS), REGEX_CACHE_CAPACITY),
            bot_id: parts.bot_id,
            default_prefix: parts.default_prefix,
        })
    }

    /// The guild's command prefix, falling back to the default
    pub async fn command_prefix(&self, guild_id: GuildId) -> String {
        match self.store.command_prefix(guild_id).await {
            Ok(Some(prefix)) if !prefix.is_empty() => prefix,
            Ok(_) => self.default_prefix.clone(),
            Err(e) => {
                warn!("Failed to load command prefix for guild {}: {}", guild_id, e);
                self.default_prefix.clone()
            }
        }
    }

    pub fn store(&self) -> &CachedCommandStore {
        &self.store
    }

    pub fn state(&self) -> &dyn GuildStateSource {
        self.state.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    pub fn regexes(&self) -> &RegexCache {
        &self.regexes
    }

    pub fn bot_id(&self) -> UserId {
        self.bot_id
    }
}
