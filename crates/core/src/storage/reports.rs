use crate::domain::report::{Report, SectorPath};
use crate::storage::ReportSource;
use anyhow::Context;
use chrono::NaiveDate;

type ReportRow = (
    NaiveDate,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

const SELECT_COLUMNS: &str = "SELECT report_date, stock_id, stock_name, report_name, \
     analyst, firm, price_goal, report_index, large_sector, medium_sector, small_sector \
     FROM analyst_reports";

#[derive(Debug, Clone)]
pub struct PgReportStore {
    pool: sqlx::PgPool,
}

impl PgReportStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Inserts reports in one transaction. Reports already stored under the same
    /// `(firm, report_index)` are left untouched. Returns the number of new rows.
    pub async fn upsert_reports(&self, reports: &[Report]) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;
        let mut inserted = 0;

        for r in reports {
            let res = sqlx::query(
                "INSERT INTO analyst_reports \
                 (report_date, stock_id, stock_name, report_name, analyst, firm, price_goal, \
                  report_index, large_sector, medium_sector, small_sector) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (firm, report_index) DO NOTHING",
            )
            .bind(r.date)
            .bind(r.stock_id.trim())
            .bind(r.stock_name.trim())
            .bind(&r.report_name)
            .bind(&r.analyst)
            .bind(r.firm.trim())
            .bind(r.price_goal.trim())
            .bind(r.report_index.trim())
            .bind(r.sector.large.trim())
            .bind(r.sector.medium.trim())
            .bind(r.sector.small.trim())
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "insert analyst_reports failed (firm={}, report_index={})",
                    r.firm, r.report_index
                )
            })?;
            inserted += res.rows_affected();
        }

        tx.commit().await.context("commit transaction failed")?;
        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl ReportSource for PgReportStore {
    async fn reports_by_sector(
        &self,
        large_sector: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "{SELECT_COLUMNS} WHERE large_sector = $1 AND report_date >= $2 \
             ORDER BY report_date DESC, firm, report_index"
        ))
        .bind(large_sector)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select reports for sector {large_sector} failed"))?;
        Ok(rows.into_iter().map(report_from_row).collect())
    }

    async fn reports_by_stock(
        &self,
        stock_id: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "{SELECT_COLUMNS} WHERE stock_id = $1 AND report_date >= $2 \
             ORDER BY report_date DESC, firm, report_index"
        ))
        .bind(stock_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select reports for stock {stock_id} failed"))?;
        Ok(rows.into_iter().map(report_from_row).collect())
    }
}

fn report_from_row(row: ReportRow) -> Report {
    let (
        date,
        stock_id,
        stock_name,
        report_name,
        analyst,
        firm,
        price_goal,
        report_index,
        large,
        medium,
        small,
    ) = row;
    Report {
        date,
        stock_id,
        stock_name,
        report_name,
        analyst,
        firm,
        price_goal,
        report_index,
        sector: SectorPath {
            large,
            medium,
            small,
        },
    }
}
