use crate::domain::score::{ScoreResult, StoredScore};
use crate::storage::ScoreStore;
use anyhow::Context;
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct PgScoreStore {
    pool: sqlx::PgPool,
}

impl PgScoreStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ScoreStore for PgScoreStore {
    async fn write_score(&self, score: &ScoreResult) -> anyhow::Result<()> {
        let row = StoredScore::from(score);
        sqlx::query(
            "INSERT INTO stock_scores \
             (stock_id, score_date, credibility, popularity, financial, composite, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             ON CONFLICT (stock_id) DO UPDATE SET \
               score_date = EXCLUDED.score_date, \
               credibility = EXCLUDED.credibility, \
               popularity = EXCLUDED.popularity, \
               financial = EXCLUDED.financial, \
               composite = EXCLUDED.composite, \
               updated_at = now()",
        )
        .bind(&row.stock_id)
        .bind(row.score_date)
        .bind(row.credibility)
        .bind(row.popularity)
        .bind(row.financial)
        .bind(row.composite)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert stock_scores failed (stock_id={})", row.stock_id))?;
        Ok(())
    }

    async fn read_score(&self, stock_id: &str) -> anyhow::Result<Option<StoredScore>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                NaiveDate,
                f64,
                Option<f64>,
                Option<f64>,
                Option<i32>,
            ),
        >(
            "SELECT stock_id, score_date, credibility, popularity, financial, composite \
             FROM stock_scores \
             WHERE stock_id = $1",
        )
        .bind(stock_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select stock_scores failed (stock_id={stock_id})"))?;

        Ok(row.map(
            |(stock_id, score_date, credibility, popularity, financial, composite)| StoredScore {
                stock_id,
                score_date,
                credibility,
                popularity,
                financial,
                composite,
            },
        ))
    }
}
