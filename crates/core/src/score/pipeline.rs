//! Batch scoring: reports -> aggregates -> signals -> scores -> score store.

use crate::aggregate::aggregate_ordered;
use crate::domain::score::ScoreResult;
use crate::ingest::collector::SignalCollector;
use crate::score::engine::ScoreEngine;
use crate::storage::{ReportSource, ScoreStore};
use crate::time::kr_market::window_start;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;

/// Scores every stock with at least one report in `sectors` over the trailing
/// `window_days` ending at `as_of`.
///
/// A failing sector query is logged and skipped; the run fails only when every sector
/// query failed.
pub async fn compute_scores(
    reports: &dyn ReportSource,
    collector: &SignalCollector,
    sectors: &[String],
    window_days: i64,
    as_of: NaiveDate,
) -> anyhow::Result<BTreeMap<String, ScoreResult>> {
    let since = window_start(as_of, window_days);
    let mut all_reports = Vec::new();
    let mut failed = 0usize;

    for sector in sectors {
        match reports.reports_by_sector(sector, since).await {
            Ok(mut rs) => {
                tracing::debug!(%sector, reports = rs.len(), "loaded sector reports");
                all_reports.append(&mut rs);
            }
            Err(err) => {
                failed += 1;
                tracing::warn!(
                    %sector,
                    error = %format!("{err:#}"),
                    "sector report query failed; skipping"
                );
            }
        }
    }
    if !sectors.is_empty() && failed == sectors.len() {
        anyhow::bail!("every sector report query failed ({failed} sectors)");
    }

    let aggregates = aggregate_ordered(&all_reports);
    tracing::info!(
        %as_of,
        %since,
        reports = all_reports.len(),
        stocks = aggregates.len(),
        "aggregated reports for scoring"
    );

    let engine = ScoreEngine;
    let bundles = collector.enrich(aggregates).await;
    Ok(bundles
        .iter()
        .map(|b| (b.aggregate.stock_id.clone(), engine.score(b, as_of)))
        .collect())
}

/// Writes each score, up to `concurrency` at a time. Failures are logged; returns the
/// number of scores written.
pub async fn persist_scores(
    store: &dyn ScoreStore,
    results: &BTreeMap<String, ScoreResult>,
    concurrency: usize,
) -> usize {
    stream::iter(results.values())
        .map(|score| async move {
            match store.write_score(score).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        stock_id = %score.stock_id,
                        error = %format!("{err:#}"),
                        "score write failed"
                    );
                    false
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter(|ok| futures::future::ready(*ok))
        .count()
        .await
}
