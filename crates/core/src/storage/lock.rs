use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Session-scoped advisory lock keeping two scoring runs for the same date apart.
const SCORE_RUN_LOCK_NAMESPACE: i64 = 0x4B43_5343_4F52; // "KCSCOR"

fn score_run_lock_key(as_of_date: NaiveDate) -> i64 {
    SCORE_RUN_LOCK_NAMESPACE ^ i64::from(as_of_date.num_days_from_ce())
}

/// Holds the run lock on a dedicated connection; advisory locks belong to the session
/// that took them, so the same connection must unlock.
pub struct ScoreRunLock {
    conn: sqlx::pool::PoolConnection<sqlx::Postgres>,
    key: i64,
}

impl ScoreRunLock {
    pub async fn try_acquire(
        pool: &sqlx::PgPool,
        as_of_date: NaiveDate,
    ) -> anyhow::Result<Option<Self>> {
        let key = score_run_lock_key(as_of_date);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for score run lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
        Ok(acquired.0.then_some(Self { conn, key }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(())
    }
}
