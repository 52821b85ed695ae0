use anyhow::Context;
use chrono::NaiveDate;

/// Counters recorded on a finished scoring run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub stocks_scored: usize,
    pub scores_written: usize,
    /// Stocks whose composite score had insufficient data.
    pub insufficient: usize,
}

pub async fn start_run(pool: &sqlx::PgPool, as_of_date: NaiveDate) -> anyhow::Result<uuid::Uuid> {
    let id = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO score_runs (id, as_of_date, started_at, status) \
         VALUES ($1, $2, $3, 'running')",
    )
    .bind(id)
    .bind(as_of_date)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .context("insert score_runs failed")?;
    Ok(id)
}

pub async fn finish_run(
    pool: &sqlx::PgPool,
    run_id: uuid::Uuid,
    summary: &RunSummary,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE score_runs \
         SET status = 'success', finished_at = $2, stocks_scored = $3, scores_written = $4, \
             insufficient = $5 \
         WHERE id = $1",
    )
    .bind(run_id)
    .bind(chrono::Utc::now())
    .bind(count_column(summary.stocks_scored))
    .bind(count_column(summary.scores_written))
    .bind(count_column(summary.insufficient))
    .execute(pool)
    .await
    .with_context(|| format!("update score_runs failed (id={run_id})"))?;
    Ok(())
}

pub async fn fail_run(pool: &sqlx::PgPool, run_id: uuid::Uuid, error: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE score_runs SET status = 'error', finished_at = $2, error = $3 WHERE id = $1",
    )
    .bind(run_id)
    .bind(chrono::Utc::now())
    .bind(error)
    .execute(pool)
    .await
    .with_context(|| format!("update error score_runs failed (id={run_id})"))?;
    Ok(())
}

fn count_column(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
