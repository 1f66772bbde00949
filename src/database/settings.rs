use super::Database;
use poise::serenity_prelude::GuildId;
use sqlx::Error as SqlxError;

impl Database {
    /// Get the command prefix for a guild (None if not set)
    pub async fn get_command_prefix(&self, guild_id: GuildId) -> Result<Option<String>, SqlxError> {
        let result: Option<(Option<String>,)> =
            sqlx::query_as("SELECT command_prefix FROM guild_settings WHERE guild_id = $1")
                .bind(guild_id.get() as i64)
                .fetch_optional(self.pool())
                .await?;

        Ok(result.and_then(|(prefix,)| prefix))
    }
}
