//! Stock detail consensus and watch-list quotes.

use crate::aggregate::{aggregate_ordered, DETAIL_WINDOW_DAYS};
use crate::domain::report::Report;
use crate::domain::signal::{DailyBar, FinancialRow, Valuation};
use crate::ingest::provider::{DailySeriesFeed, FinancialFeed, QuoteFeed};
use crate::score::engine::{credibility_score, round1, round2, round_half_up};
use crate::storage::{ReportSource, ScoreStore};
use crate::time::kr_market::window_start;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

/// Sessions of daily history shown next to the consensus.
pub const PRICE_HISTORY_SESSIONS: usize = 65;
/// Fiscal years shown on the financials view.
pub const FINANCIAL_VIEW_YEARS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockConsensus {
    pub stock_id: String,
    pub stock_name: Option<String>,
    /// Reports over the trailing detail window, newest first.
    pub reports: Vec<Report>,
    pub since: NaiveDate,
    /// Rounded mean target over reports dated on or after `since`.
    pub price_target_average: Option<i64>,
    pub price_target_count: usize,
    pub trade_price: Option<f64>,
    pub change_rate: Option<f64>,
    /// PER, PBR and ROE from the live quote.
    pub valuation: Option<Valuation>,
    /// Percent upside, one decimal.
    pub expected_yield: Option<f64>,
    pub credibility_score: f64,
    /// Latest stored composite score.
    pub score: Option<i32>,
    pub price_history: Vec<DailyBar>,
}

pub struct ConsensusSources<'a> {
    pub reports: &'a dyn ReportSource,
    pub quotes: &'a dyn QuoteFeed,
    pub series: &'a dyn DailySeriesFeed,
    pub scores: &'a dyn ScoreStore,
}

/// Consensus for one stock. Only the report store is required; quote, series and stored
/// score failures leave their fields empty.
pub async fn stock_consensus(
    src: &ConsensusSources<'_>,
    stock_id: &str,
    since: NaiveDate,
    today: NaiveDate,
) -> anyhow::Result<StockConsensus> {
    let year_ago = window_start(today, DETAIL_WINDOW_DAYS);
    let reports = src
        .reports
        .reports_by_stock(stock_id, year_ago)
        .await
        .with_context(|| format!("load reports for stock {stock_id}"))?;

    let recent: Vec<Report> = reports.iter().filter(|r| r.date >= since).cloned().collect();
    let agg = aggregate_ordered(&recent).into_iter().next();
    let price_target_average = agg
        .as_ref()
        .and_then(|a| a.price_target_average)
        .map(|avg| round_half_up(avg) as i64);
    let price_target_count = agg.as_ref().map_or(0, |a| a.price_target_count);

    let ids = [stock_id.to_string()];
    let (quote, price_history, stored) = tokio::join!(
        src.quotes.fetch_current_quotes(&ids),
        src.series.fetch_daily_series(stock_id, PRICE_HISTORY_SESSIONS),
        src.scores.read_score(stock_id),
    );

    let quote = quote
        .map_err(|err| {
            tracing::warn!(%stock_id, error = %format!("{err:#}"), "quote unavailable");
        })
        .ok()
        .and_then(|mut q| q.remove(stock_id));
    let price_history = price_history.unwrap_or_else(|err| {
        tracing::warn!(%stock_id, error = %format!("{err:#}"), "daily series unavailable");
        Vec::new()
    });
    let score = match stored {
        Ok(row) => row.and_then(|r| r.composite),
        Err(err) => {
            tracing::warn!(%stock_id, error = %format!("{err:#}"), "stored score unavailable");
            None
        }
    };

    let trade_price = quote.as_ref().map(|q| q.trade_price);
    let expected_yield = match (price_target_average, trade_price) {
        (Some(avg), Some(p)) if p > 0.0 => Some(round1((avg as f64 / p - 1.0) * 100.0)),
        _ => None,
    };

    Ok(StockConsensus {
        stock_id: stock_id.to_string(),
        stock_name: reports.first().map(|r| r.stock_name.trim().to_string()),
        since,
        price_target_average,
        price_target_count,
        trade_price,
        change_rate: quote.as_ref().and_then(|q| q.change_rate),
        valuation: quote.as_ref().map(Valuation::from_quote),
        expected_yield,
        credibility_score: credibility_score(expected_yield, price_target_count),
        score,
        price_history,
        reports,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualFinancials {
    pub year: i32,
    pub revenue: Option<f64>,
    pub op_income: Option<f64>,
    pub net_income: Option<f64>,
    /// Operating margin in percent, two decimals.
    pub op_margin: Option<f64>,
    /// Net margin in percent, two decimals.
    pub net_margin: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub op_income_growth: Option<f64>,
    pub net_income_growth: Option<f64>,
    pub eps: Option<f64>,
    pub debt_ratio: Option<f64>,
}

fn margin(part: Option<f64>, revenue: Option<f64>) -> Option<f64> {
    match (part, revenue) {
        (Some(p), Some(r)) if r != 0.0 => Some(round2(p / r * 100.0)),
        _ => None,
    }
}

/// Display rows for the latest fiscal years, oldest first.
pub fn financial_view(history: &[FinancialRow]) -> Vec<AnnualFinancials> {
    let skip = history.len().saturating_sub(FINANCIAL_VIEW_YEARS);
    history[skip..]
        .iter()
        .map(|row| AnnualFinancials {
            year: row.year,
            revenue: row.revenue,
            op_income: row.op_income,
            net_income: row.net_income,
            op_margin: margin(row.op_income, row.revenue),
            net_margin: margin(row.net_income, row.revenue),
            revenue_growth: row.revenue_delta.map(round2),
            op_income_growth: row.op_income_delta.map(round2),
            net_income_growth: row.net_income_delta.map(round2),
            eps: row.eps,
            debt_ratio: row.debt_ratio,
        })
        .collect()
}

pub async fn annual_financials(
    feed: &dyn FinancialFeed,
    stock_id: &str,
) -> anyhow::Result<Vec<AnnualFinancials>> {
    let history = feed
        .fetch_annual_financials(stock_id)
        .await
        .with_context(|| format!("load annual financials for {stock_id}"))?;
    Ok(financial_view(&history))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchQuote {
    pub stock_id: String,
    pub trade_price: f64,
    /// Signed daily change in percent.
    pub change_rate: Option<f64>,
}

/// Current price and signed change for a watch list, in request order. Ids missing from
/// the feed response are omitted.
pub async fn watch_list_quotes(
    quotes: &dyn QuoteFeed,
    stock_ids: &[String],
) -> anyhow::Result<Vec<WatchQuote>> {
    let mut live = quotes
        .fetch_current_quotes(stock_ids)
        .await
        .context("fetch watch list quotes")?;
    Ok(stock_ids
        .iter()
        .filter_map(|id| live.remove(id))
        .map(|q| WatchQuote {
            stock_id: q.stock_id,
            trade_price: q.trade_price,
            change_rate: q.change_rate,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::report;
    use crate::ingest::collector::tests::{bars, quote, FakeFeeds};
    use crate::storage::testing::{MemoryReports, MemoryScores};

    fn dated(stock_id: &str, goal: &str, idx: usize, date: (i32, u32, u32)) -> Report {
        let mut r = report(stock_id, goal, idx);
        r.date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        r
    }

    #[tokio::test]
    async fn average_covers_only_reports_since_date() {
        let reports = MemoryReports {
            reports: vec![
                dated("011070", "120000", 1, (2021, 6, 1)),
                dated("011070", "100000", 2, (2021, 5, 20)),
                dated("011070", "50000", 3, (2021, 1, 4)),
                dated("011070", "10000", 4, (2019, 12, 30)),
            ],
            ..MemoryReports::default()
        };
        let mut feeds = FakeFeeds::default();
        feeds
            .quotes
            .insert("011070".to_string(), quote("011070", 100_000.0, 1.0, 1.0));
        feeds
            .series
            .insert("011070".to_string(), bars(&[1.0; 70], &[1.0; 70]));
        let scores = MemoryScores::default();
        let src = ConsensusSources {
            reports: &reports,
            quotes: &feeds,
            series: &feeds,
            scores: &scores,
        };

        let today = NaiveDate::from_ymd_opt(2021, 6, 10).unwrap();
        let since = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
        let c = stock_consensus(&src, "011070", since, today).await.unwrap();

        // The 2019 report is outside the trailing year.
        assert_eq!(c.reports.len(), 3);
        assert_eq!(c.price_target_average, Some(110_000));
        assert_eq!(c.price_target_count, 2);
        assert_eq!(c.expected_yield, Some(10.0));
        assert_eq!(c.credibility_score, 20.0);
        let v = c.valuation.unwrap();
        assert_eq!(v.per, Some(100_000.0));
        assert_eq!(c.score, None);
        assert_eq!(c.price_history.len(), PRICE_HISTORY_SESSIONS);
    }

    #[tokio::test]
    async fn no_recent_target_means_no_yield() {
        let reports = MemoryReports {
            reports: vec![dated("035420", "0", 1, (2021, 6, 1))],
            ..MemoryReports::default()
        };
        let feeds = FakeFeeds {
            fail_quotes: true,
            ..FakeFeeds::default()
        };
        let scores = MemoryScores::default();
        let src = ConsensusSources {
            reports: &reports,
            quotes: &feeds,
            series: &feeds,
            scores: &scores,
        };
        let today = NaiveDate::from_ymd_opt(2021, 6, 10).unwrap();
        let c = stock_consensus(&src, "035420", today, today).await.unwrap();
        assert_eq!(c.price_target_average, None);
        assert_eq!(c.expected_yield, None);
        assert_eq!(c.trade_price, None);
        assert_eq!(c.valuation, None);
        assert_eq!(c.credibility_score, 0.0);
        assert_eq!(c.stock_name.as_deref(), Some("Name 035420"));
    }

    fn statement(year: i32, revenue: f64, op_income: f64, net_income: f64) -> FinancialRow {
        FinancialRow {
            year,
            revenue: Some(revenue),
            revenue_delta: Some(2.784),
            op_income: Some(op_income),
            net_income: Some(net_income),
            ..FinancialRow::default()
        }
    }

    #[test]
    fn financial_view_keeps_latest_years_with_margins() {
        let history: Vec<FinancialRow> = (2014..=2021)
            .map(|y| statement(y, 2_000.0, 300.0, 150.0))
            .collect();
        let view = financial_view(&history);
        assert_eq!(view.len(), FINANCIAL_VIEW_YEARS);
        assert_eq!(view[0].year, 2016);
        assert_eq!(view[5].year, 2021);
        assert_eq!(view[5].op_margin, Some(15.0));
        assert_eq!(view[5].net_margin, Some(7.5));
        assert_eq!(view[5].revenue_growth, Some(2.78));
        assert_eq!(view[5].net_income_growth, None);
    }

    #[test]
    fn zero_revenue_has_no_margin() {
        let view = financial_view(&[statement(2021, 0.0, 10.0, 5.0)]);
        assert_eq!(view[0].op_margin, None);
        assert_eq!(view[0].net_margin, None);
    }

    #[tokio::test]
    async fn annual_financials_surfaces_feed_failure() {
        let mut feeds = FakeFeeds::default();
        let rows = vec![statement(2021, 2_796_048.0, 516_339.0, 399_074.0)];
        feeds.financials.insert("005930".to_string(), rows);
        let view = annual_financials(&feeds, "005930").await.unwrap();
        assert_eq!(view[0].op_margin, Some(18.47));
        assert!(annual_financials(&feeds, "000660").await.is_err());
    }

    #[tokio::test]
    async fn watch_list_keeps_request_order_and_drops_unknown_ids() {
        let mut feeds = FakeFeeds::default();
        feeds
            .quotes
            .insert("000660".to_string(), quote("000660", 120_000.0, 1.0, 1.0));
        feeds
            .quotes
            .insert("005930".to_string(), quote("005930", 81_000.0, 1.0, 1.0));
        let ids: Vec<String> = ["005930", "999999", "000660"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = watch_list_quotes(&feeds, &ids).await.unwrap();
        let got: Vec<&str> = out.iter().map(|q| q.stock_id.as_str()).collect();
        assert_eq!(got, vec!["005930", "000660"]);
    }
}
