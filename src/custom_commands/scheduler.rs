use chrono::{Duration, Utc};
use poise::serenity_prelude::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::CcEngine;
use super::executor::{TemplateContext, TriggerData};
use super::interval::next_run_time;
use super::state::{ChannelInfo, GuildPresence};
use super::store::CommandStore;
use super::types::{CustomCommand, DelayedRunCcData, NextRunScheduledEvent};
use crate::constants::{EVENT_DELAYED_RUN, EVENT_NEXT_RUN, NEXT_RUN_STALE_SECS, OVERDUE_REPAIR_SECS};
use crate::error::CcError;
use crate::schedule::{DueOutcome, NewScheduledEvent, PendingFilter, ScheduledEvent};

/// Where a scheduled run should happen, or why it cannot right now
enum Target {
    Ready(ChannelInfo),
    Drop,
    Retry,
}

impl CcEngine {
    /// Defer a run; always adds a new event
    pub async fn schedule_delayed_run(
        &self,
        guild_id: GuildId,
        data: DelayedRunCcData,
        delay: Duration,
    ) -> Result<(), CcError> {
        let event = NewScheduledEvent {
            name: EVENT_DELAYED_RUN,
            guild_id,
            triggers_at: Utc::now() + delay,
            cmd_id: Some(data.cmd_id),
            unique_key: data.user_key.clone(),
            data: serde_json::to_value(&data)?,
        };
        self.scheduler.schedule(event).await
    }

    /// Defer a run, replacing any pending run for the same command and key
    pub async fn schedule_unique_run(
        &self,
        guild_id: GuildId,
        data: DelayedRunCcData,
        delay: Duration,
    ) -> Result<(), CcError> {
        if data.user_key.is_none() {
            return self.schedule_delayed_run(guild_id, data, delay).await;
        }

        let event = NewScheduledEvent {
            name: EVENT_DELAYED_RUN,
            guild_id,
            triggers_at: Utc::now() + delay,
            cmd_id: Some(data.cmd_id),
            unique_key: data.user_key.clone(),
            data: serde_json::to_value(&data)?,
        };
        self.scheduler.schedule_replacing(event).await
    }

    /// Remove the pending run for a command and key without replacing it
    pub async fn cancel_unique_run(&self, guild_id: GuildId, cmd_id: i64, key: &str) -> Result<u64, CcError> {
        self.scheduler
            .delete_pending(&PendingFilter {
                name: EVENT_DELAYED_RUN,
                guild_id,
                cmd_id,
                unique_key: Some(key.to_string()),
            })
            .await
    }

    /// Recompute and store the next run of a timed command, re-arming its event.
    ///
    /// With `clear_old` any pending next-run event for the command is removed first.
    pub async fn update_next_run(
        &self,
        cmd: &mut CustomCommand,
        update_last_run: bool,
        clear_old: bool,
    ) -> Result<(), CcError> {
        if clear_old {
            self.scheduler
                .delete_pending(&PendingFilter {
                    name: EVENT_NEXT_RUN,
                    guild_id: cmd.guild_id,
                    cmd_id: cmd.local_id,
                    unique_key: None,
                })
                .await?;
        }

        let next = if cmd.is_enabled() {
            next_run_time(cmd, Utc::now())?
        } else {
            None
        };
        cmd.next_run = next;

        let last_run = if update_last_run { cmd.last_run } else { None };
        self.store
            .update_run_times(cmd.guild_id, cmd.local_id, last_run, next)
            .await?;

        let Some(next) = next else {
            return Ok(());
        };

        self.scheduler
            .schedule(NewScheduledEvent {
                name: EVENT_NEXT_RUN,
                guild_id: cmd.guild_id,
                triggers_at: next,
                data: serde_json::to_value(NextRunScheduledEvent { cmd_id: cmd.local_id })?,
                cmd_id: Some(cmd.local_id),
                unique_key: None,
            })
            .await
    }

    /// Check that a scheduled run's guild and channel are usable
    async fn resolve_target(&self, guild_id: GuildId, channel_id: ChannelId) -> Target {
        match self.state.guild_presence(guild_id) {
            GuildPresence::Missing => match self.state.bot_on_guild(guild_id).await {
                Ok(false) => {
                    info!("Dropping scheduled custom command run, bot left guild {}", guild_id);
                    Target::Drop
                }
                Ok(true) => Target::Retry,
                Err(e) => {
                    error!("Failed checking whether bot is on guild {}: {}", guild_id, e);
                    Target::Retry
                }
            },
            GuildPresence::Unavailable => Target::Retry,
            GuildPresence::Available => match self.state.channel(guild_id, channel_id) {
                Some(channel) => Target::Ready(channel),
                None => {
                    info!(
                        "Dropping scheduled custom command run, channel {} is gone from guild {}",
                        channel_id, guild_id
                    );
                    Target::Drop
                }
            },
        }
    }

    /// Delivery of a `cc_delayed_run` event
    pub async fn handle_delayed_run(self: &Arc<Self>, event: &ScheduledEvent) -> Result<DueOutcome, CcError> {
        let data: DelayedRunCcData = serde_json::from_value(event.data.clone())?;
        let guild_id = event.guild_id;

        let cmd = self
            .store
            .command(guild_id, data.cmd_id)
            .await?
            .ok_or(CcError::UnknownCommand(data.cmd_id))?;
        cmd.ensure_enabled()?;

        let channel = match self.resolve_target(guild_id, data.channel_id).await {
            Target::Ready(channel) => channel,
            Target::Drop => return Ok(DueOutcome::Done),
            Target::Retry => return Ok(DueOutcome::Retry),
        };

        if !self.delayed_limiter.allow(guild_id, channel.id).await? {
            warn!(
                "Dropping delayed run of custom command #{} in guild {}, channel {} is rate limited",
                cmd.local_id, guild_id, channel.id
            );
            return Ok(DueOutcome::Done);
        }

        let mut member = data.member.clone();
        if let Some(snapshot) = &data.member {
            match self.state.member(guild_id, snapshot.user_id).await {
                Ok(fresh) => member = Some(fresh),
                Err(e) => warn!("Using stored member for delayed run, refresh failed: {}", e),
            }
        }

        let exec_data = data
            .user_data
            .as_deref()
            .map(serde_json::from_slice::<serde_json::Value>)
            .transpose()?;

        let ctx = TemplateContext::new(&cmd, channel, TriggerData::Delayed { exec_data })
            .with_member(member)
            .with_message(data.message.clone());
        if let Err(e) = self.execute_command(&cmd, ctx).await {
            error!(
                "Failed delivering delayed run of custom command #{} in guild {}: {}",
                cmd.local_id, guild_id, e
            );
        }

        Ok(DueOutcome::Done)
    }

    /// Delivery of a `cc_next_run` event
    pub async fn handle_next_run(self: &Arc<Self>, event: &ScheduledEvent) -> Result<DueOutcome, CcError> {
        let data: NextRunScheduledEvent = serde_json::from_value(event.data.clone())?;
        let guild_id = event.guild_id;

        let mut cmd = self
            .store
            .command(guild_id, data.cmd_id)
            .await?
            .ok_or(CcError::UnknownCommand(data.cmd_id))?;
        cmd.ensure_enabled()?;

        if !cmd.trigger.is_timed() {
            info!(
                "Skipping next run of custom command #{} in guild {}, no longer timed",
                cmd.local_id, guild_id
            );
            return Ok(DueOutcome::Done);
        }

        // rescheduled since this event was created
        if let Some(next) = cmd.next_run {
            if next - Utc::now() > Duration::seconds(NEXT_RUN_STALE_SECS) {
                return Ok(DueOutcome::Done);
            }
        }

        let Some(channel_id) = cmd.context_channel else {
            warn!(
                "Timed custom command #{} in guild {} has no channel",
                cmd.local_id, guild_id
            );
            return Ok(DueOutcome::Done);
        };

        let channel = match self.resolve_target(guild_id, channel_id).await {
            Target::Ready(channel) => channel,
            Target::Drop => return Ok(DueOutcome::Done),
            Target::Retry => return Ok(DueOutcome::Retry),
        };

        let ctx = TemplateContext::new(&cmd, channel, TriggerData::Timed);
        if let Err(e) = self.execute_command(&cmd, ctx).await {
            error!(
                "Failed running timed custom command #{} in guild {}: {}",
                cmd.local_id, guild_id, e
            );
        }

        cmd.last_run = cmd.next_run.or(Some(Utc::now()));
        self.update_next_run(&mut cmd, true, true).await?;
        Ok(DueOutcome::Done)
    }

    /// Run a timed command right away in its context channel and re-arm it
    pub async fn run_now(self: &Arc<Self>, guild_id: GuildId, local_id: i64) -> Result<(), CcError> {
        let mut cmd = self
            .store
            .command(guild_id, local_id)
            .await?
            .ok_or(CcError::UnknownCommand(local_id))?;

        let channel_id = cmd.context_channel.ok_or(CcError::UnknownChannel)?;
        let channel = self
            .state
            .channel(guild_id, channel_id)
            .ok_or(CcError::UnknownChannel)?;

        let ctx = TemplateContext::new(&cmd, channel, TriggerData::RunNow);
        self.execute_command(&cmd, ctx).await?;

        if cmd.trigger.is_timed() {
            cmd.last_run = Some(Utc::now());
            self.update_next_run(&mut cmd, true, true).await?;
        }
        Ok(())
    }

    /// Re-arm timed commands left without a live schedule (e.g. after downtime)
    pub async fn repair_overdue_schedules(&self) -> Result<usize, CcError> {
        let before = Utc::now() - Duration::seconds(OVERDUE_REPAIR_SECS);
        let overdue = self.store.overdue_timed_commands(before).await?;

        let mut repaired = 0;
        for mut cmd in overdue {
            match self.update_next_run(&mut cmd, false, true).await {
                Ok(()) => repaired += 1,
                Err(e) => error!(
                    "Failed to re-arm custom command #{} in guild {}: {}",
                    cmd.local_id, cmd.guild_id, e
                ),
            }
        }
        Ok(repaired)
    }

    /// React to a command edited outside the bot
    pub async fn on_command_changed(&self, guild_id: GuildId, local_id: Option<i64>) -> Result<(), CcError> {
        self.store.invalidate(guild_id);

        let Some(local_id) = local_id else {
            return Ok(());
        };

        match self.store.command(guild_id, local_id).await? {
            Some(mut cmd) if cmd.trigger.is_timed() => self.update_next_run(&mut cmd, false, true).await,
            _ => {
                self.scheduler
                    .delete_pending(&PendingFilter {
                        name: EVENT_NEXT_RUN,
                        guild_id,
                        cmd_id: local_id,
                        unique_key: None,
                    })
                    .await?;
                Ok(())
            }
        }
    }
}
