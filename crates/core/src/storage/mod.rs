use crate::domain::report::Report;
use crate::domain::score::{ScoreResult, StoredScore};
use anyhow::Context;
use chrono::NaiveDate;

pub mod lock;
pub mod reports;
pub mod runs;
pub mod scores;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Read side of the report store. Results are newest first.
#[async_trait::async_trait]
pub trait ReportSource: Send + Sync {
    /// Reports whose large (WICS) sector is `large_sector`, dated on or after `since`.
    async fn reports_by_sector(
        &self,
        large_sector: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<Report>>;

    async fn reports_by_stock(&self, stock_id: &str, since: NaiveDate)
        -> anyhow::Result<Vec<Report>>;
}

/// Latest score per stock. A write replaces the stock's previous score.
#[async_trait::async_trait]
pub trait ScoreStore: Send + Sync {
    async fn write_score(&self, score: &ScoreResult) -> anyhow::Result<()>;

    async fn read_score(&self, stock_id: &str) -> anyhow::Result<Option<StoredScore>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory report store; sectors listed in `failing_sectors` return an error.
    #[derive(Default)]
    pub(crate) struct MemoryReports {
        pub reports: Vec<Report>,
        pub failing_sectors: Vec<String>,
    }

    #[async_trait::async_trait]
    impl ReportSource for MemoryReports {
        async fn reports_by_sector(
            &self,
            large_sector: &str,
            since: NaiveDate,
        ) -> anyhow::Result<Vec<Report>> {
            anyhow::ensure!(
                !self.failing_sectors.iter().any(|s| s == large_sector),
                "sector query failed"
            );
            Ok(self
                .reports
                .iter()
                .filter(|r| r.sector.large == large_sector && r.date >= since)
                .cloned()
                .collect())
        }

        async fn reports_by_stock(
            &self,
            stock_id: &str,
            since: NaiveDate,
        ) -> anyhow::Result<Vec<Report>> {
            Ok(self
                .reports
                .iter()
                .filter(|r| r.stock_id == stock_id && r.date >= since)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryScores {
        pub rows: Mutex<HashMap<String, StoredScore>>,
        pub failing_ids: Vec<String>,
    }

    #[async_trait::async_trait]
    impl ScoreStore for MemoryScores {
        async fn write_score(&self, score: &ScoreResult) -> anyhow::Result<()> {
            anyhow::ensure!(
                !self.failing_ids.contains(&score.stock_id),
                "write failed"
            );
            let mut rows = self.rows.lock().unwrap();
            rows.insert(score.stock_id.clone(), StoredScore::from(score));
            Ok(())
        }

        async fn read_score(&self, stock_id: &str) -> anyhow::Result<Option<StoredScore>> {
            anyhow::ensure!(!self.failing_ids.iter().any(|s| s == stock_id), "read failed");
            Ok(self.rows.lock().unwrap().get(stock_id).cloned())
        }
    }
}
