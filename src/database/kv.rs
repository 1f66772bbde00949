use async_trait::async_trait;
use sqlx::Error as SqlxError;
use std::time::Duration;

use super::Database;
use crate::custom_commands::KvStore;
use crate::error::CcError;

impl Database {
    /// Delete expired guard keys, returning how many went
    pub async fn purge_expired_keys(&self) -> Result<u64, SqlxError> {
        let result = sqlx::query("DELETE FROM cc_kv_entries WHERE expires_at <= NOW()")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete rate buckets untouched for `idle`; by then they would be full again anyway
    pub async fn purge_idle_buckets(&self, idle: Duration) -> Result<u64, SqlxError> {
        let result = sqlx::query(
            "DELETE FROM cc_rate_buckets WHERE updated_at < NOW() - make_interval(secs => $1)",
        )
        .bind(idle.as_secs_f64())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KvStore for Database {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, CcError> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM cc_kv_entries
                WHERE bucket = $1 AND key = $2 AND expires_at > NOW()
            )
            "#,
        )
        .bind(bucket)
        .bind(key)
        .fetch_one(self.pool())
        .await?;
        Ok(found)
    }

    async fn set_if_absent(&self, bucket: &str, key: &str, ttl: Duration) -> Result<bool, CcError> {
        // an expired row is taken over; a live one leaves the upsert without a returned row
        let set: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO cc_kv_entries (bucket, key, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (bucket, key) DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE cc_kv_entries.expires_at <= NOW()
            RETURNING key
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(ttl.as_secs_f64())
        .fetch_optional(self.pool())
        .await?;
        Ok(set.is_some())
    }

    async fn take_token(&self, key: &str, rate: f64, burst: u32) -> Result<bool, CcError> {
        let taken: Option<(f64,)> = sqlx::query_as(
            r#"
            INSERT INTO cc_rate_buckets (key, tokens, updated_at)
            VALUES ($1, $3 - 1, NOW())
            ON CONFLICT (key) DO UPDATE SET
                tokens = LEAST($3, cc_rate_buckets.tokens
                    + EXTRACT(EPOCH FROM (NOW() - cc_rate_buckets.updated_at))::DOUBLE PRECISION * $2) - 1,
                updated_at = NOW()
            WHERE LEAST($3, cc_rate_buckets.tokens
                + EXTRACT(EPOCH FROM (NOW() - cc_rate_buckets.updated_at))::DOUBLE PRECISION * $2) >= 1
            RETURNING tokens
            "#,
        )
        .bind(key)
        .bind(rate)
        .bind(f64::from(burst))
        .fetch_optional(self.pool())
        .await?;
        Ok(taken.is_some())
    }
}
