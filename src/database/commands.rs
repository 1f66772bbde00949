use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, RoleId};
use sqlx::Error as SqlxError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::Database;
use crate::custom_commands::{
    CommandGroup, CommandStore, CronSchedule, CustomCommand, InteractionDeferMode, IntervalSchedule,
    ReactionMode, RoleTriggerMode, TextTrigger, TimeExclusions, Trigger, TriggerCategory, TriggerKind,
};
use crate::error::CcError;
use crate::utils::permissions::ScopeList;

const COMMAND_COLUMNS: &str = r#"
    guild_id, local_id, group_id, trigger_type, text_trigger, text_trigger_case_sensitive,
    channels, channels_whitelist_mode, roles, roles_whitelist_mode, disabled, response,
    context_channel, reaction_trigger_mode, role_trigger_mode, interval_minutes, cron_expression,
    excluded_weekdays, excluded_hours, trigger_on_edit, show_errors, redirect_errors_channel,
    interaction_defer_mode, last_run, next_run, run_count
"#;

type GroupRow = (i64, i64, String, Vec<i64>, Vec<i64>, Vec<i64>, Vec<i64>, bool);

#[derive(Debug, sqlx::FromRow)]
struct CommandRow {
    guild_id: i64,
    local_id: i64,
    group_id: Option<i64>,
    trigger_type: i32,
    text_trigger: String,
    text_trigger_case_sensitive: bool,
    channels: Vec<i64>,
    channels_whitelist_mode: bool,
    roles: Vec<i64>,
    roles_whitelist_mode: bool,
    disabled: bool,
    response: String,
    context_channel: Option<i64>,
    reaction_trigger_mode: i16,
    role_trigger_mode: i16,
    interval_minutes: i32,
    cron_expression: String,
    excluded_weekdays: Vec<i16>,
    excluded_hours: Vec<i16>,
    trigger_on_edit: bool,
    show_errors: bool,
    redirect_errors_channel: Option<i64>,
    interaction_defer_mode: i16,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    run_count: i64,
}

fn channel_id(raw: i64) -> Option<ChannelId> {
    (raw > 0).then(|| ChannelId::new(raw as u64))
}

fn channel_ids(raw: &[i64]) -> Vec<ChannelId> {
    raw.iter().copied().filter_map(channel_id).collect()
}

fn role_ids(raw: &[i64]) -> Vec<RoleId> {
    raw.iter()
        .copied()
        .filter(|v| *v > 0)
        .map(|v| RoleId::new(v as u64))
        .collect()
}

fn small_values(raw: &[i16], max: i16) -> Vec<u8> {
    raw.iter()
        .copied()
        .filter(|v| (0..=max).contains(v))
        .map(|v| v as u8)
        .collect()
}

fn group_from_row(row: GroupRow) -> Option<CommandGroup> {
    let (id, guild_id, name, ignore_roles, whitelist_roles, ignore_channels, whitelist_channels, disabled) =
        row;
    if guild_id <= 0 {
        return None;
    }
    let mut group = CommandGroup::new(id, GuildId::new(guild_id as u64));
    group.name = name;
    group.ignore_roles = role_ids(&ignore_roles);
    group.whitelist_roles = role_ids(&whitelist_roles);
    group.ignore_channels = channel_ids(&ignore_channels);
    group.whitelist_channels = channel_ids(&whitelist_channels);
    group.disabled = disabled;
    Some(group)
}

impl CommandRow {
    fn trigger(&self) -> Result<Trigger, CcError> {
        let text = || TextTrigger::new(self.text_trigger.clone(), self.text_trigger_case_sensitive);
        let exclusions = || TimeExclusions {
            weekdays: small_values(&self.excluded_weekdays, 6),
            hours: small_values(&self.excluded_hours, 23),
        };

        let trigger = match TriggerKind::from_i32(self.trigger_type)? {
            TriggerKind::Command => Trigger::Command(text()),
            TriggerKind::StartsWith => Trigger::StartsWith(text()),
            TriggerKind::Contains => Trigger::Contains(text()),
            TriggerKind::Regex => Trigger::Regex(text()),
            TriggerKind::Exact => Trigger::Exact(text()),
            TriggerKind::Component => Trigger::Component(text()),
            TriggerKind::Modal => Trigger::Modal(text()),
            TriggerKind::Reaction => Trigger::Reaction(ReactionMode::from_i16(self.reaction_trigger_mode)),
            TriggerKind::RoleChange => Trigger::RoleChange(RoleTriggerMode::from_i16(self.role_trigger_mode)),
            TriggerKind::Interval => Trigger::Interval(IntervalSchedule {
                minutes: self.interval_minutes,
                exclusions: exclusions(),
            }),
            TriggerKind::Cron => Trigger::Cron(CronSchedule {
                expression: self.cron_expression.clone(),
                exclusions: exclusions(),
            }),
            TriggerKind::None => Trigger::None,
        };
        Ok(trigger)
    }

    fn into_command(self, groups: &HashMap<i64, Arc<CommandGroup>>) -> Result<CustomCommand, CcError> {
        if self.guild_id <= 0 {
            return Err(CcError::UnknownCommand(self.local_id));
        }
        let mut cc = CustomCommand::new(GuildId::new(self.guild_id as u64), self.local_id, self.trigger()?);
        cc.group = self.group_id.and_then(|id| groups.get(&id).cloned());
        cc.channels = ScopeList::new(channel_ids(&self.channels), self.channels_whitelist_mode);
        cc.roles = ScopeList::new(role_ids(&self.roles), self.roles_whitelist_mode);
        cc.disabled = self.disabled;
        cc.response = self.response;
        cc.context_channel = self.context_channel.and_then(channel_id);
        cc.trigger_on_edit = self.trigger_on_edit;
        cc.show_errors = self.show_errors;
        cc.redirect_errors_channel = self.redirect_errors_channel.and_then(channel_id);
        cc.defer_mode = InteractionDeferMode::from_i16(self.interaction_defer_mode);
        cc.last_run = self.last_run;
        cc.next_run = self.next_run;
        cc.run_count = self.run_count;
        Ok(cc)
    }
}

/// Convert rows, skipping (and logging) rows that cannot be interpreted
fn into_commands(rows: Vec<CommandRow>, groups: &HashMap<i64, Arc<CommandGroup>>) -> Vec<CustomCommand> {
    rows.into_iter()
        .filter_map(|row| {
            let (guild_id, local_id) = (row.guild_id, row.local_id);
            row.into_command(groups)
                .map_err(|e| warn!("Skipping custom command #{} in guild {}: {}", local_id, guild_id, e))
                .ok()
        })
        .collect()
}

impl Database {
    async fn groups_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Arc<CommandGroup>>, SqlxError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT id, guild_id, name, ignore_roles, whitelist_roles, ignore_channels, whitelist_channels, disabled
            FROM custom_command_groups
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(group_from_row)
            .map(|g| (g.id, Arc::new(g)))
            .collect())
    }

    async fn with_groups(&self, rows: Vec<CommandRow>) -> Result<Vec<CustomCommand>, SqlxError> {
        let mut group_ids: Vec<i64> = rows.iter().filter_map(|r| r.group_id).collect();
        group_ids.sort_unstable();
        group_ids.dedup();
        let groups = self.groups_by_ids(&group_ids).await?;
        Ok(into_commands(rows, &groups))
    }

    /// Commands of the given trigger kinds in a guild, by local id
    pub async fn get_commands_by_kinds(
        &self,
        guild_id: GuildId,
        kinds: &[TriggerKind],
    ) -> Result<Vec<CustomCommand>, SqlxError> {
        let kinds: Vec<i32> = kinds.iter().map(|k| k.as_i32()).collect();
        let rows: Vec<CommandRow> = sqlx::query_as(&format!(
            "SELECT {} FROM custom_commands WHERE guild_id = $1 AND trigger_type = ANY($2) ORDER BY local_id",
            COMMAND_COLUMNS
        ))
        .bind(guild_id.get() as i64)
        .bind(&kinds)
        .fetch_all(self.pool())
        .await?;

        self.with_groups(rows).await
    }

    pub async fn get_command(&self, guild_id: GuildId, local_id: i64) -> Result<Option<CustomCommand>, SqlxError> {
        let row: Option<CommandRow> = sqlx::query_as(&format!(
            "SELECT {} FROM custom_commands WHERE guild_id = $1 AND local_id = $2",
            COMMAND_COLUMNS
        ))
        .bind(guild_id.get() as i64)
        .bind(local_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(self.with_groups(row.into_iter().collect()).await?.pop())
    }

    /// Enabled timed commands with no next run, or one before `before`
    pub async fn get_overdue_timed_commands(&self, before: DateTime<Utc>) -> Result<Vec<CustomCommand>, SqlxError> {
        let rows: Vec<CommandRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM custom_commands
            WHERE trigger_type = ANY($1) AND disabled = FALSE AND (next_run IS NULL OR next_run < $2)
            "#,
            COMMAND_COLUMNS
        ))
        .bind(vec![TriggerKind::Interval.as_i32(), TriggerKind::Cron.as_i32()])
        .bind(before)
        .fetch_all(self.pool())
        .await?;

        let commands = self.with_groups(rows).await?;
        Ok(commands.into_iter().filter(|cc| cc.is_enabled()).collect())
    }

    pub async fn set_command_run_times(
        &self,
        guild_id: GuildId,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            UPDATE custom_commands
            SET last_run = COALESCE($3, last_run), next_run = $4
            WHERE guild_id = $1 AND local_id = $2
            "#,
        )
        .bind(guild_id.get() as i64)
        .bind(local_id)
        .bind(last_run)
        .bind(next_run)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Count a run and remember its error, if any
    pub async fn record_command_run(
        &self,
        guild_id: GuildId,
        local_id: i64,
        error: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            UPDATE custom_commands
            SET run_count = run_count + 1,
                last_error = COALESCE($3, last_error),
                last_error_time = CASE WHEN $3::TEXT IS NULL THEN last_error_time ELSE NOW() END
            WHERE guild_id = $1 AND local_id = $2
            "#,
        )
        .bind(guild_id.get() as i64)
        .bind(local_id)
        .bind(error)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandStore for Database {
    async fn commands_by_category(
        &self,
        guild_id: GuildId,
        category: TriggerCategory,
    ) -> Result<Vec<Arc<CustomCommand>>, CcError> {
        let commands = self.get_commands_by_kinds(guild_id, category.kinds()).await?;
        Ok(commands.into_iter().map(Arc::new).collect())
    }

    async fn command(&self, guild_id: GuildId, local_id: i64) -> Result<Option<CustomCommand>, CcError> {
        Ok(self.get_command(guild_id, local_id).await?)
    }

    async fn command_prefix(&self, guild_id: GuildId) -> Result<Option<String>, CcError> {
        Ok(self.get_command_prefix(guild_id).await?)
    }

    async fn update_run_times(
        &self,
        guild_id: GuildId,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CcError> {
        Ok(self
            .set_command_run_times(guild_id, local_id, last_run, next_run)
            .await?)
    }

    async fn record_run(&self, guild_id: GuildId, local_id: i64, error: Option<&str>) -> Result<(), CcError> {
        Ok(self.record_command_run(guild_id, local_id, error).await?)
    }

    async fn overdue_timed_commands(&self, before: DateTime<Utc>) -> Result<Vec<CustomCommand>, CcError> {
        Ok(self.get_overdue_timed_commands(before).await?)
    }
}
