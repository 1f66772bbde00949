use super::Database;
use sqlx::Error as SqlxError;

impl Database {
    /// Run database migrations to create tables
    pub(super) async fn run_migrations(&self) -> Result<(), SqlxError> {
        self.create_custom_command_tables().await?;
        self.create_guild_settings_table().await?;
        self.create_scheduled_events_table().await?;
        self.create_guard_tables().await?;
        Ok(())
    }

    async fn create_custom_command_tables(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS custom_command_groups (
                id BIGSERIAL PRIMARY KEY,
                guild_id BIGINT NOT NULL,
                name TEXT NOT NULL,
                ignore_roles BIGINT[] NOT NULL DEFAULT '{}',
                whitelist_roles BIGINT[] NOT NULL DEFAULT '{}',
                ignore_channels BIGINT[] NOT NULL DEFAULT '{}',
                whitelist_channels BIGINT[] NOT NULL DEFAULT '{}',
                disabled BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS custom_commands (
                guild_id BIGINT NOT NULL,
                local_id BIGINT NOT NULL,
                group_id BIGINT REFERENCES custom_command_groups(id) ON DELETE SET NULL,
                trigger_type INT NOT NULL,
                text_trigger TEXT NOT NULL DEFAULT '',
                text_trigger_case_sensitive BOOLEAN NOT NULL DEFAULT FALSE,
                channels BIGINT[] NOT NULL DEFAULT '{}',
                channels_whitelist_mode BOOLEAN NOT NULL DEFAULT FALSE,
                roles BIGINT[] NOT NULL DEFAULT '{}',
                roles_whitelist_mode BOOLEAN NOT NULL DEFAULT FALSE,
                disabled BOOLEAN NOT NULL DEFAULT FALSE,
                response TEXT NOT NULL DEFAULT '',
                context_channel BIGINT,
                reaction_trigger_mode SMALLINT NOT NULL DEFAULT 0,
                role_trigger_mode SMALLINT NOT NULL DEFAULT 0,
                interval_minutes INT NOT NULL DEFAULT 0,
                cron_expression TEXT NOT NULL DEFAULT '',
                excluded_weekdays SMALLINT[] NOT NULL DEFAULT '{}',
                excluded_hours SMALLINT[] NOT NULL DEFAULT '{}',
                trigger_on_edit BOOLEAN NOT NULL DEFAULT FALSE,
                show_errors BOOLEAN NOT NULL DEFAULT TRUE,
                redirect_errors_channel BIGINT,
                interaction_defer_mode SMALLINT NOT NULL DEFAULT 0,
                last_run TIMESTAMPTZ,
                next_run TIMESTAMPTZ,
                run_count BIGINT NOT NULL DEFAULT 0,
                last_error TEXT,
                last_error_time TIMESTAMPTZ,
                PRIMARY KEY (guild_id, local_id)
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_custom_commands_next_run
            ON custom_commands (next_run)
            WHERE trigger_type IN (5, 9)
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn create_guild_settings_table(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_settings (
                guild_id BIGINT PRIMARY KEY,
                command_prefix TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn create_scheduled_events_table(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_events (
                id BIGSERIAL PRIMARY KEY,
                guild_id BIGINT NOT NULL,
                event_name TEXT NOT NULL,
                triggers_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL,
                cmd_id BIGINT,
                unique_key TEXT,
                processed BOOLEAN NOT NULL DEFAULT FALSE,
                error TEXT,
                attempts INT NOT NULL DEFAULT 0,
                generation BIGINT NOT NULL DEFAULT 0,
                claimed_until TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        // At most one pending event per unique key
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_scheduled_events_unique_key
            ON scheduled_events (guild_id, event_name, cmd_id, unique_key)
            WHERE processed = FALSE AND unique_key IS NOT NULL
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_scheduled_events_due
            ON scheduled_events (triggers_at)
            WHERE processed = FALSE
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn create_guard_tables(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cc_kv_entries (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (bucket, key)
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cc_rate_buckets (
                key TEXT PRIMARY KEY,
                tokens DOUBLE PRECISION NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }
}
