//! Sector page: per-stock consensus upside within one large sector, ranked by small sector.

use crate::aggregate::{aggregate_ordered, StockAggregate};
use crate::domain::sector::{SectorOverview, SectorRanking, SectorStock, SectorYield};
use crate::domain::signal::Quote;
use crate::ingest::provider::QuoteFeed;
use crate::score::engine::{round1, round_half_up};
use crate::storage::{ReportSource, ScoreStore};
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::HashMap;

const TOP_SECTORS: usize = 3;

/// Builds the ranking for `large_sector` from reports dated on or after `since`.
///
/// Returns `NoData` when no stock has both a usable target and a live quote, or when the
/// quote feed fails. Report store failures are errors.
pub async fn sector_overview(
    reports: &dyn ReportSource,
    quotes: &dyn QuoteFeed,
    scores: &dyn ScoreStore,
    large_sector: &str,
    since: NaiveDate,
) -> anyhow::Result<SectorOverview> {
    let rs = reports
        .reports_by_sector(large_sector, since)
        .await
        .with_context(|| format!("load reports for sector {large_sector}"))?;

    let targeted: Vec<StockAggregate> = aggregate_ordered(&rs)
        .into_iter()
        .filter(|a| a.price_target_count > 0)
        .collect();
    if targeted.is_empty() {
        return Ok(no_data(large_sector));
    }

    let ids: Vec<String> = targeted.iter().map(|a| a.stock_id.clone()).collect();
    let live = match quotes.fetch_current_quotes(&ids).await {
        Ok(q) => q,
        Err(err) => {
            tracing::warn!(
                sector = %large_sector,
                source = quotes.source_name(),
                error = %format!("{err:#}"),
                "sector quotes unavailable"
            );
            return Ok(no_data(large_sector));
        }
    };

    let mut ranking = rank_stocks(large_sector, &targeted, &live);
    if ranking.stocks.is_empty() {
        return Ok(no_data(large_sector));
    }

    for stock in &mut ranking.stocks {
        stock.score = match scores.read_score(&stock.stock_id).await {
            Ok(row) => row.and_then(|r| r.composite),
            Err(err) => {
                tracing::warn!(
                    stock_id = %stock.stock_id,
                    error = %format!("{err:#}"),
                    "stored score unavailable"
                );
                None
            }
        };
    }

    Ok(SectorOverview::Ranked(ranking))
}

/// Ranks aggregates that have a positive live price. Pure; scores are attached later.
pub fn rank_stocks(
    large_sector: &str,
    aggregates: &[StockAggregate],
    quotes: &HashMap<String, Quote>,
) -> SectorRanking {
    let mut stocks = Vec::new();
    for agg in aggregates {
        let (Some(avg), Some(q)) = (agg.price_target_average, quotes.get(&agg.stock_id)) else {
            continue;
        };
        if q.trade_price.is_nan() || q.trade_price <= 0.0 {
            continue;
        }
        let price_target_average = round_half_up(avg) as i64;
        let expected_yield = round1((price_target_average as f64 / q.trade_price - 1.0) * 100.0);
        stocks.push(SectorStock {
            stock_id: agg.stock_id.clone(),
            stock_name: agg.stock_name.clone(),
            small_sector: agg.small_sector.clone(),
            trade_price: q.trade_price,
            change_rate: q.change_rate,
            price_target_average,
            price_target_count: agg.price_target_count,
            expected_yield,
            score: None,
        });
    }

    // Small sectors in first-seen order with (sum, count).
    let mut groups: Vec<(String, f64, usize)> = Vec::new();
    for s in &stocks {
        match groups.iter_mut().find(|(name, _, _)| *name == s.small_sector) {
            Some(g) => {
                g.1 += s.expected_yield;
                g.2 += 1;
            }
            None => groups.push((s.small_sector.clone(), s.expected_yield, 1)),
        }
    }
    let mut sector_yields: Vec<SectorYield> = groups
        .into_iter()
        .map(|(name, sum, n)| SectorYield {
            name,
            average_yield: sum / n as f64,
        })
        .collect();
    sector_yields.sort_by(|a, b| b.average_yield.total_cmp(&a.average_yield));
    let top3_sectors = sector_yields
        .into_iter()
        .take(TOP_SECTORS)
        .map(|s| SectorYield {
            average_yield: round1(s.average_yield),
            ..s
        })
        .collect();

    let average_expected_yield = if stocks.is_empty() {
        0.0
    } else {
        round1(stocks.iter().map(|s| s.expected_yield).sum::<f64>() / stocks.len() as f64)
    };

    SectorRanking {
        sector_name: large_sector.to_string(),
        stocks,
        average_expected_yield,
        top3_sectors,
    }
}

fn no_data(large_sector: &str) -> SectorOverview {
    SectorOverview::NoData {
        sector_name: large_sector.to_string(),
    }
}
