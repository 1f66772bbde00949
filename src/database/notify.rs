use super::Database;
use sqlx::Error as SqlxError;
use sqlx::postgres::PgListener;

impl Database {
    /// Open a dedicated connection listening on a notification channel
    pub async fn listen(&self, channel: &str) -> Result<PgListener, SqlxError> {
        let mut listener = PgListener::connect_with(self.pool()).await?;
        listener.listen(channel).await?;
        Ok(listener)
    }
}
