//! Per-stock folding of analyst reports into counts and consensus price targets.

use crate::domain::report::Report;
use serde::Serialize;
use std::collections::HashMap;

/// Trailing window used by the daily scoring run.
pub const SCORING_WINDOW_DAYS: i64 = 91;
/// Trailing window shown on stock-detail pages.
pub const DETAIL_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAggregate {
    pub stock_id: String,
    pub stock_name: String,
    pub small_sector: String,
    pub report_count: usize,
    pub price_targets: Vec<i64>,
    pub price_target_count: usize,
    /// Mean of `price_targets`; `None` when the stock has no usable target.
    pub price_target_average: Option<f64>,
}

impl StockAggregate {
    fn new(report: &Report) -> Self {
        Self {
            stock_id: report.stock_id.clone(),
            stock_name: report.stock_name.trim().to_string(),
            small_sector: report.sector.small.clone(),
            report_count: 0,
            price_targets: Vec::new(),
            price_target_count: 0,
            price_target_average: None,
        }
    }

    fn push(&mut self, report: &Report) {
        self.report_count += 1;
        if let Some(target) = parse_price_goal(&report.price_goal) {
            self.price_targets.push(target);
            self.price_target_count += 1;
        }
    }

    fn finish(&mut self) {
        self.price_target_average = if self.price_targets.is_empty() {
            None
        } else {
            let sum: f64 = self.price_targets.iter().map(|&t| t as f64).sum();
            Some(sum / self.price_targets.len() as f64)
        };
    }

    /// Upside of the average target over `trade_price`, in percent.
    pub fn expected_yield(&self, trade_price: f64) -> Option<f64> {
        let avg = self.price_target_average?;
        if trade_price.is_nan() || trade_price <= 0.0 {
            return None;
        }
        Some((avg / trade_price - 1.0) * 100.0)
    }
}

/// Parses a raw target price. Zero, negative and unparsable values mean "no target".
pub fn parse_price_goal(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '원')
        .collect();
    match cleaned.parse::<i64>() {
        Ok(v) if v > 0 => Some(v),
        _ => None,
    }
}

/// Folds reports by stock id. Iteration order of the result is unspecified.
pub fn aggregate(reports: &[Report]) -> HashMap<String, StockAggregate> {
    aggregate_ordered(reports)
        .into_iter()
        .map(|a| (a.stock_id.clone(), a))
        .collect()
}

/// Same fold as [`aggregate`], returned in first-seen order for display paths.
pub fn aggregate_ordered(reports: &[Report]) -> Vec<StockAggregate> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<StockAggregate> = Vec::new();

    for report in reports {
        let idx = *index.entry(report.stock_id.as_str()).or_insert_with(|| {
            out.push(StockAggregate::new(report));
            out.len() - 1
        });
        out[idx].push(report);
    }

    for agg in &mut out {
        agg.finish();
    }
    out
}
