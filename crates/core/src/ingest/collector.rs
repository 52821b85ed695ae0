//! Per-stock enrichment with valuation, financial history and trading momentum.
//!
//! Every fetch is isolated: a failing source leaves that stock's signal unset and the
//! batch continues.

use crate::aggregate::StockAggregate;
use crate::config::Settings;
use crate::domain::signal::{
    DailyBar, Direction, FinancialRow, Momentum, Popularity, Signal, Valuation,
};
use crate::error::log_source_failure;
use crate::ingest::provider::{DailySeriesFeed, FinancialFeed, QuoteFeed};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Trailing sessions fetched and evaluated for volume and 20-day momentum.
pub const MOMENTUM_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub concurrency: usize,
    pub quote_batch_size: usize,
    pub progress_every: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            quote_batch_size: 100,
            progress_every: 50,
        }
    }
}

impl CollectorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.enrich_concurrency.max(1),
            quote_batch_size: settings.quote_batch_size.max(1),
            ..Self::default()
        }
    }
}

/// A stock aggregate with every signal the scorer consumes.
#[derive(Debug, Clone, Serialize)]
pub struct SignalBundle {
    pub aggregate: StockAggregate,
    pub valuation: Option<Valuation>,
    /// Percent upside of the average target over the trade price.
    pub expected_yield: Option<f64>,
    pub financial_history: Vec<FinancialRow>,
    pub popularity: Signal<Popularity>,
}

pub struct SignalCollector {
    quotes: Arc<dyn QuoteFeed>,
    financials: Arc<dyn FinancialFeed>,
    series: Arc<dyn DailySeriesFeed>,
    opts: CollectorOptions,
}

impl SignalCollector {
    pub fn new(
        quotes: Arc<dyn QuoteFeed>,
        financials: Arc<dyn FinancialFeed>,
        series: Arc<dyn DailySeriesFeed>,
        opts: CollectorOptions,
    ) -> Self {
        Self {
            quotes,
            financials,
            series,
            opts,
        }
    }

    /// Batch valuation lookup. A failed batch leaves its stocks without valuation.
    pub async fn fetch_valuation(&self, stock_ids: &[String]) -> HashMap<String, Valuation> {
        let mut out = HashMap::new();
        for chunk in stock_ids.chunks(self.opts.quote_batch_size.max(1)) {
            match self.quotes.fetch_current_quotes(chunk).await {
                Ok(quotes) => {
                    for (id, q) in quotes {
                        out.insert(id, Valuation::from_quote(&q));
                    }
                }
                Err(err) => log_source_failure(
                    self.quotes.source_name(),
                    &chunk.join(","),
                    &err,
                    "quote batch failed; valuation unavailable for batch",
                ),
            }
        }
        out
    }

    pub async fn fetch_financial_history(&self, stock_id: &str) -> Vec<FinancialRow> {
        match self.financials.fetch_annual_financials(stock_id).await {
            Ok(rows) => rows,
            Err(err) => {
                log_source_failure(
                    self.financials.source_name(),
                    stock_id,
                    &err,
                    "financial history unavailable",
                );
                Vec::new()
            }
        }
    }

    pub async fn fetch_momentum(&self, stock_id: &str) -> Signal<Popularity> {
        match self.series.fetch_daily_series(stock_id, MOMENTUM_WINDOW).await {
            Ok(bars) => popularity_from_series(&bars),
            Err(err) => {
                log_source_failure(
                    self.series.source_name(),
                    stock_id,
                    &err,
                    "daily series unavailable",
                );
                Signal::Insufficient
            }
        }
    }

    /// Enriches every aggregate. Per-stock fetches run concurrently up to the configured
    /// limit; each returned bundle is complete. Output order is unspecified.
    pub async fn enrich(&self, aggregates: Vec<StockAggregate>) -> Vec<SignalBundle> {
        let ids: Vec<String> = aggregates.iter().map(|a| a.stock_id.clone()).collect();
        let valuations = self.fetch_valuation(&ids).await;
        let total = aggregates.len();

        let mut pending = stream::iter(aggregates.into_iter().map(|aggregate| {
            let valuation = valuations.get(&aggregate.stock_id).copied();
            self.enrich_one(aggregate, valuation)
        }))
        .buffer_unordered(self.opts.concurrency.max(1));

        let mut out = Vec::with_capacity(total);
        while let Some(bundle) = pending.next().await {
            out.push(bundle);
            let n = out.len();
            if self.opts.progress_every != 0
                && (n == 1 || n == total || n % self.opts.progress_every == 0)
            {
                tracing::info!(processed = n, total, "signal enrichment progress");
            }
        }
        out
    }

    async fn enrich_one(
        &self,
        aggregate: StockAggregate,
        valuation: Option<Valuation>,
    ) -> SignalBundle {
        let stock_id = aggregate.stock_id.clone();
        let (financial_history, popularity) = tokio::join!(
            self.fetch_financial_history(&stock_id),
            self.fetch_momentum(&stock_id)
        );
        let expected_yield = valuation.and_then(|v| aggregate.expected_yield(v.trade_price));

        SignalBundle {
            aggregate,
            valuation,
            expected_yield,
            financial_history,
            popularity,
        }
    }
}

/// Volume acceleration and price direction over an oldest-first series.
///
/// Only the trailing [`MOMENTUM_WINDOW`] bars are evaluated, so the last element is always
/// the most recent session. Fewer bars is insufficient data.
pub fn popularity_from_series(bars: &[DailyBar]) -> Signal<Popularity> {
    let Some(start) = bars.len().checked_sub(MOMENTUM_WINDOW) else {
        return Signal::Insufficient;
    };
    let w = &bars[start..];

    let recent: f64 = w[15..20].iter().map(|b| b.volume).sum();
    let prior: f64 = w[10..15].iter().map(|b| b.volume).sum();
    let volume_increase_ratio = recent / prior - 1.0;
    if !volume_increase_ratio.is_finite() {
        return Signal::Insufficient;
    }

    let latest = w[MOMENTUM_WINDOW - 1].close;
    let direction = |sessions: usize| {
        let base = w[MOMENTUM_WINDOW - sessions].close;
        if latest / base > 1.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    };

    Signal::Available(Popularity {
        volume_increase_ratio,
        momentum: Momentum {
            day5: direction(5),
            day10: direction(10),
            day20: direction(20),
        },
    })
}
