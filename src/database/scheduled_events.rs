use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::GuildId;
use sqlx::Error as SqlxError;

use super::Database;
use crate::error::CcError;
use crate::schedule::{EventScheduler, NewScheduledEvent, PendingFilter, ScheduledEvent};

type EventRow = (i64, i64, String, DateTime<Utc>, serde_json::Value, i32, i64);

fn event_from_row(row: EventRow) -> Option<ScheduledEvent> {
    let (id, guild_id, name, triggers_at, data, attempts, generation) = row;
    (guild_id > 0).then(|| ScheduledEvent {
        id,
        guild_id: GuildId::new(guild_id as u64),
        name,
        triggers_at,
        data,
        attempts,
        generation,
    })
}

impl Database {
    async fn insert_scheduled_event<'e, E>(&self, executor: E, event: &NewScheduledEvent) -> Result<(), SqlxError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO scheduled_events (guild_id, event_name, triggers_at, data, cmd_id, unique_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.guild_id.get() as i64)
        .bind(event.name)
        .bind(event.triggers_at)
        .bind(&event.data)
        .bind(event.cmd_id)
        .bind(&event.unique_key)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Claim due events for this process, leasing them for `lease_secs`
    pub async fn claim_due_events(&self, limit: i64, lease_secs: f64) -> Result<Vec<ScheduledEvent>, SqlxError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            UPDATE scheduled_events
            SET claimed_until = NOW() + make_interval(secs => $2), generation = generation + 1
            WHERE id IN (
                SELECT id FROM scheduled_events
                WHERE processed = FALSE
                  AND triggers_at <= NOW()
                  AND (claimed_until IS NULL OR claimed_until < NOW())
                ORDER BY triggers_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, guild_id, event_name, triggers_at, data, attempts, generation
            "#,
        )
        .bind(limit)
        .bind(lease_secs)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().filter_map(event_from_row).collect())
    }

    /// Mark a claimed event processed; ignored if it was replaced since the claim
    pub async fn mark_event_processed(&self, id: i64, generation: i64, error: Option<&str>) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_events
            SET processed = TRUE, error = $3, claimed_until = NULL
            WHERE id = $1 AND generation = $2
            "#,
        )
        .bind(id)
        .bind(generation)
        .bind(error)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Put a claimed event back with a later trigger time
    pub async fn reschedule_event(
        &self,
        id: i64,
        generation: i64,
        triggers_at: DateTime<Utc>,
        attempts: i32,
        error: &str,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_events
            SET triggers_at = $3, attempts = $4, error = $5, claimed_until = NULL
            WHERE id = $1 AND generation = $2 AND processed = FALSE
            "#,
        )
        .bind(id)
        .bind(generation)
        .bind(triggers_at)
        .bind(attempts)
        .bind(error)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EventScheduler for Database {
    async fn schedule(&self, event: NewScheduledEvent) -> Result<(), CcError> {
        self.insert_scheduled_event(self.pool(), &event).await?;
        Ok(())
    }

    async fn schedule_replacing(&self, event: NewScheduledEvent) -> Result<(), CcError> {
        if event.unique_key.is_some() {
            // the partial unique index makes this a single atomic replace
            sqlx::query(
                r#"
                INSERT INTO scheduled_events (guild_id, event_name, triggers_at, data, cmd_id, unique_key)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (guild_id, event_name, cmd_id, unique_key)
                    WHERE processed = FALSE AND unique_key IS NOT NULL
                DO UPDATE SET
                    triggers_at = EXCLUDED.triggers_at,
                    data = EXCLUDED.data,
                    attempts = 0,
                    error = NULL,
                    claimed_until = NULL,
                    generation = scheduled_events.generation + 1
                "#,
            )
            .bind(event.guild_id.get() as i64)
            .bind(event.name)
            .bind(event.triggers_at)
            .bind(&event.data)
            .bind(event.cmd_id)
            .bind(&event.unique_key)
            .execute(self.pool())
            .await?;
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            DELETE FROM scheduled_events
            WHERE processed = FALSE AND guild_id = $1 AND event_name = $2
              AND cmd_id IS NOT DISTINCT FROM $3 AND unique_key IS NULL
            "#,
        )
        .bind(event.guild_id.get() as i64)
        .bind(event.name)
        .bind(event.cmd_id)
        .execute(&mut *tx)
        .await?;
        self.insert_scheduled_event(&mut *tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_pending(&self, filter: &PendingFilter) -> Result<u64, CcError> {
        let result = sqlx::query(
            r#"
            DELETE FROM scheduled_events
            WHERE processed = FALSE AND event_name = $1 AND guild_id = $2 AND cmd_id = $3
              AND ($4::TEXT IS NULL OR unique_key = $4)
            "#,
        )
        .bind(filter.name)
        .bind(filter.guild_id.get() as i64)
        .bind(filter.cmd_id)
        .bind(&filter.unique_key)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
