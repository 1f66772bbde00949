use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CcError;

/// Shared key-value store used for fleet-wide guards.
///
/// Every mutating call must be atomic at the store so concurrent processes agree.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Whether a live (unexpired) key exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, CcError>;

    /// Set the key with a TTL unless a live one exists; true when this call set it
    async fn set_if_absent(&self, bucket: &str, key: &str, ttl: Duration) -> Result<bool, CcError>;

    /// Take one token from a bucket refilling at `rate` per second up to `burst`
    async fn take_token(&self, key: &str, rate: f64, burst: u32) -> Result<bool, CcError>;
}

pub const ROLE_COOLDOWN_BUCKET: &str = "cc_role_trigger";
pub const RUN_NOW_BUCKET: &str = "cc_run_now";

/// Cooldown key, `<guild>:<user>:<role>` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleCooldownKey {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub role_id: RoleId,
}

impl fmt::Display for RoleCooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.guild_id, self.user_id, self.role_id)
    }
}

/// Suppresses repeated role triggers for the same member and role
#[derive(Clone)]
pub struct RoleTriggerCooldown {
    kv: Arc<dyn KvStore>,
}

impl RoleTriggerCooldown {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn is_active(&self, key: RoleCooldownKey) -> Result<bool, CcError> {
        self.kv.exists(ROLE_COOLDOWN_BUCKET, &key.to_string()).await
    }

    /// Start the cooldown; false if another process already holds it
    pub async fn try_start(&self, key: RoleCooldownKey, ttl: Duration) -> Result<bool, CcError> {
        self.kv
            .set_if_absent(ROLE_COOLDOWN_BUCKET, &key.to_string(), ttl)
            .await
    }
}

/// Token bucket over scheduler-originated runs per (guild, channel)
#[derive(Clone)]
pub struct DelayedRunLimiter {
    kv: Arc<dyn KvStore>,
    rate: f64,
    burst: u32,
}

impl DelayedRunLimiter {
    pub fn new(kv: Arc<dyn KvStore>, rate: f64, burst: u32) -> Self {
        Self { kv, rate, burst }
    }

    pub async fn allow(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool, CcError> {
        let key = format!("cc_delayed_run:{}:{}", guild_id, channel_id);
        self.kv.take_token(&key, self.rate, self.burst).await
    }
}

/// How long an untouched bucket takes to refill completely; past that it can be forgotten
pub fn full_refill_after(rate: f64, burst: u32) -> Duration {
    if rate <= 0.0 {
        return Duration::MAX;
    }
    Duration::from_secs_f64((f64::from(burst) / rate).ceil())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_commands::testing::MemoryKv;

    fn key() -> RoleCooldownKey {
        RoleCooldownKey {
            guild_id: GuildId::new(1),
            user_id: UserId::new(2),
            role_id: RoleId::new(3),
        }
    }

    #[test]
    fn test_full_refill_after() {
        assert_eq!(full_refill_after(0.1, 10), Duration::from_secs(100));
        assert_eq!(full_refill_after(3.0, 10), Duration::from_secs(4));
        assert_eq!(full_refill_after(0.0, 10), Duration::MAX);
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key().to_string(), "1:2:3");
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_trigger() {
        let cooldown = RoleTriggerCooldown::new(Arc::new(MemoryKv::default()));

        assert!(!cooldown.is_active(key()).await.unwrap());
        assert!(cooldown.try_start(key(), Duration::from_secs(300)).await.unwrap());
        assert!(cooldown.is_active(key()).await.unwrap());
        assert!(!cooldown.try_start(key(), Duration::from_secs(300)).await.unwrap());

        let other = RoleCooldownKey {
            role_id: RoleId::new(4),
            ..key()
        };
        assert!(!cooldown.is_active(other).await.unwrap());
    }

    #[tokio::test]
    async fn test_cooldown_expires() {
        let cooldown = RoleTriggerCooldown::new(Arc::new(MemoryKv::default()));
        assert!(cooldown.try_start(key(), Duration::ZERO).await.unwrap());
        assert!(!cooldown.is_active(key()).await.unwrap());
        assert!(cooldown.try_start(key(), Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_limiter_burst_then_drop() {
        let limiter = DelayedRunLimiter::new(Arc::new(MemoryKv::default()), 0.1, 10);
        let (guild, channel) = (GuildId::new(1), ChannelId::new(2));

        for _ in 0..10 {
            assert!(limiter.allow(guild, channel).await.unwrap());
        }
        assert!(!limiter.allow(guild, channel).await.unwrap());
        assert!(limiter.allow(guild, ChannelId::new(3)).await.unwrap());
    }
}
