//! Sub-scores and the composite investment-attractiveness score.
//!
//! Every sub-score is on a 0..=100 scale. Popularity and financial scores can be
//! insufficient; the composite is insufficient whenever either of them is.

use crate::domain::score::ScoreResult;
use crate::domain::signal::{Direction, FinancialRow, Momentum, Popularity, Signal};
use crate::ingest::collector::SignalBundle;
use chrono::NaiveDate;
use serde::Serialize;

const CAPPED_COUNT: usize = 10;

/// Upside and analyst coverage. A missing or non-positive yield scores zero.
pub fn credibility_score(expected_yield: Option<f64>, price_target_count: usize) -> f64 {
    let Some(y) = expected_yield.filter(|y| y.is_finite() && *y > 0.0) else {
        return 0.0;
    };
    let yield_points = if y >= 50.0 { 10.0 } else { y.abs() / 5.0 };
    let count_points = price_target_count.min(CAPPED_COUNT) as f64;
    (yield_points + count_points) * 5.0
}

pub fn volume_component(volume_increase_ratio: f64) -> f64 {
    if volume_increase_ratio < 0.0 {
        0.0
    } else if volume_increase_ratio > 2.0 {
        100.0
    } else {
        volume_increase_ratio / 0.25 * 12.5
    }
}

pub fn momentum_component(m: &Momentum) -> f64 {
    use Direction::{Down, Up};
    match (m.day5, m.day10, m.day20) {
        (Up, Up, Up) => 100.0,
        (Up, Up, Down) => 80.0,
        (Up, Down, _) => 60.0,
        (Down, Up, Up) => 20.0,
        (Down, Up, Down) => 40.0,
        (Down, Down, Up) => 20.0,
        (Down, Down, Down) => 0.0,
    }
}

pub fn report_component(report_count: usize) -> f64 {
    if report_count > CAPPED_COUNT {
        100.0
    } else {
        report_count as f64 * 12.5
    }
}

pub fn popularity_score(popularity: &Signal<Popularity>, report_count: usize) -> Signal<f64> {
    popularity.as_ref().map(|p| {
        (volume_component(p.volume_increase_ratio)
            + momentum_component(&p.momentum)
            + report_component(report_count))
            / 3.0
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrowthMetrics {
    pub peg: f64,
    /// Mean net-income growth over the last two fiscal years.
    pub ni_growth_1yr: f64,
    /// Mean net-income growth over the last three fiscal years.
    pub ni_growth_2yr: f64,
}

/// PEG and net-income growth from the trailing rows of an oldest-first history.
///
/// A zero EPS on either side yields an infinite growth or PEG, which still scores; only
/// NaN results (`0 / 0`, `inf / inf`) are rejected.
pub fn growth_metrics(per: Option<f64>, history: &[FinancialRow]) -> Option<GrowthMetrics> {
    let per = per?;
    let [.., r3, r2, r1] = history else {
        return None;
    };

    let eps_growth = 100.0 * r1.eps? / r2.eps?;
    let peg = per / eps_growth;
    let (d1, d2, d3) = (r1.net_income_delta?, r2.net_income_delta?, r3.net_income_delta?);
    let ni_growth_2yr = (d1 + d2 + d3) / 3.0;
    let ni_growth_1yr = (d1 + d2) / 2.0;

    let any_nan = [peg, ni_growth_1yr, ni_growth_2yr].iter().any(|v| v.is_nan());
    (!any_nan).then_some(GrowthMetrics {
        peg,
        ni_growth_1yr,
        ni_growth_2yr,
    })
}

pub fn financial_score(metrics: Option<GrowthMetrics>) -> Signal<f64> {
    let Some(m) = metrics else {
        return Signal::Insufficient;
    };

    // Higher PEG in the 0.5..=1 band scores higher; kept as the live formula.
    let peg_score = if m.peg < 0.5 {
        100.0
    } else if m.peg > 1.0 {
        0.0
    } else {
        round_half_up(m.peg * 100.0)
    };

    let mut ni_score = if m.ni_growth_2yr > 100.0 {
        100.0
    } else if m.ni_growth_2yr < 0.0 {
        0.0
    } else {
        round_half_up(m.ni_growth_2yr)
    };

    let dif = m.ni_growth_1yr - m.ni_growth_2yr;
    if dif < 0.0 {
        if dif.abs() > ni_score {
            ni_score = 0.0;
        } else {
            ni_score += dif;
        }
    }

    Signal::Available((peg_score + ni_score) / 2.0)
}

pub fn composite_score(
    credibility: f64,
    popularity: &Signal<f64>,
    financial: &Signal<f64>,
) -> Signal<i32> {
    match (popularity, financial) {
        (Signal::Available(p), Signal::Available(f)) => {
            Signal::Available(round_half_up((credibility + p + f) / 3.0) as i32)
        }
        _ => Signal::Insufficient,
    }
}

/// Rounds halves toward positive infinity (`-2.5 -> -2`).
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// One decimal place, halves up.
pub fn round1(x: f64) -> f64 {
    round_half_up(x * 10.0) / 10.0
}

pub fn round2(x: f64) -> f64 {
    round_half_up(x * 100.0) / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreEngine;

impl ScoreEngine {
    pub fn score(&self, bundle: &SignalBundle, date: NaiveDate) -> ScoreResult {
        let agg = &bundle.aggregate;
        let credibility_score = credibility_score(bundle.expected_yield, agg.price_target_count);
        let popularity_score = popularity_score(&bundle.popularity, agg.report_count);
        let per = bundle.valuation.and_then(|v| v.per);
        let financial_score = financial_score(growth_metrics(per, &bundle.financial_history));
        let composite_score =
            composite_score(credibility_score, &popularity_score, &financial_score);

        ScoreResult {
            stock_id: agg.stock_id.clone(),
            date,
            credibility_score,
            popularity_score,
            financial_score,
            composite_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::{Down, Up};

    fn momentum(day5: Direction, day10: Direction, day20: Direction) -> Momentum {
        Momentum { day5, day10, day20 }
    }

    fn fin_row(year: i32, eps: Option<f64>, ni_delta: Option<f64>) -> FinancialRow {
        FinancialRow {
            year,
            eps,
            net_income_delta: ni_delta,
            ..FinancialRow::default()
        }
    }

    #[test]
    fn credibility_is_zero_without_positive_yield() {
        assert_eq!(credibility_score(None, 5), 0.0);
        assert_eq!(credibility_score(Some(0.0), 5), 0.0);
        assert_eq!(credibility_score(Some(-12.0), 8), 0.0);
        assert_eq!(credibility_score(Some(f64::NAN), 8), 0.0);
    }

    #[test]
    fn credibility_caps_yield_and_count() {
        assert_eq!(credibility_score(Some(10.0), 2), 20.0);
        assert_eq!(credibility_score(Some(50.0), 10), 100.0);
        assert_eq!(credibility_score(Some(80.0), 25), 100.0);
    }

    #[test]
    fn credibility_is_monotone_in_count_up_to_ten() {
        let mut prev = 0.0;
        for count in 0..=12 {
            let s = credibility_score(Some(10.0), count);
            assert!(s >= prev);
            prev = s;
        }
        assert_eq!(credibility_score(Some(10.0), 10), credibility_score(Some(10.0), 12));
    }

    #[test]
    fn volume_component_boundaries() {
        assert_eq!(volume_component(-0.5), 0.0);
        assert_eq!(volume_component(2.5), 100.0);
        assert_eq!(volume_component(0.125), 6.25);
        assert_eq!(volume_component(2.0), 100.0);
    }

    #[test]
    fn momentum_table() {
        assert_eq!(momentum_component(&momentum(Up, Up, Up)), 100.0);
        assert_eq!(momentum_component(&momentum(Up, Up, Down)), 80.0);
        assert_eq!(momentum_component(&momentum(Up, Down, Up)), 60.0);
        assert_eq!(momentum_component(&momentum(Up, Down, Down)), 60.0);
        assert_eq!(momentum_component(&momentum(Down, Up, Up)), 20.0);
        assert_eq!(momentum_component(&momentum(Down, Up, Down)), 40.0);
        assert_eq!(momentum_component(&momentum(Down, Down, Up)), 20.0);
        assert_eq!(momentum_component(&momentum(Down, Down, Down)), 0.0);
    }

    #[test]
    fn popularity_averages_three_components() {
        let p = Signal::Available(Popularity {
            volume_increase_ratio: 0.5,
            momentum: momentum(Up, Up, Up),
        });
        // volume 25, momentum 100, reports 4 * 12.5 = 50
        assert_eq!(popularity_score(&p, 4), Signal::Available(175.0 / 3.0));
        assert_eq!(popularity_score(&Signal::Insufficient, 4), Signal::Insufficient);
        assert_eq!(report_component(11), 100.0);
    }

    #[test]
    fn growth_metrics_need_three_rows_and_per() {
        let rows = vec![
            fin_row(2019, Some(3_000.0), Some(10.0)),
            fin_row(2020, Some(4_000.0), Some(20.0)),
            fin_row(2021, Some(5_000.0), Some(30.0)),
        ];
        let m = growth_metrics(Some(20.0), &rows).unwrap();
        assert!((m.peg - 0.16).abs() < 1e-12);
        assert_eq!(m.ni_growth_2yr, 20.0);
        assert_eq!(m.ni_growth_1yr, 25.0);

        assert_eq!(growth_metrics(None, &rows), None);
        assert_eq!(growth_metrics(Some(20.0), &rows[1..]), None);

        let mut missing = rows.clone();
        missing[0].net_income_delta = None;
        assert_eq!(growth_metrics(Some(20.0), &missing), None);

        let mut zero_eps = rows;
        zero_eps[1].eps = Some(0.0);
        zero_eps[2].eps = Some(0.0);
        assert_eq!(growth_metrics(Some(20.0), &zero_eps), None);
    }

    #[test]
    fn zero_prior_eps_means_unbounded_growth_and_top_peg_score() {
        let rows = vec![
            fin_row(2019, Some(100.0), Some(10.0)),
            fin_row(2020, Some(0.0), Some(20.0)),
            fin_row(2021, Some(50.0), Some(30.0)),
        ];
        let m = growth_metrics(Some(20.0), &rows).unwrap();
        assert_eq!(m.peg, 0.0);
        // pegScore 100, niScore 20
        assert_eq!(financial_score(Some(m)), Signal::Available(60.0));
    }

    #[test]
    fn zero_latest_eps_means_infinite_peg_and_bottom_peg_score() {
        let rows = vec![
            fin_row(2019, Some(100.0), Some(10.0)),
            fin_row(2020, Some(50.0), Some(20.0)),
            fin_row(2021, Some(0.0), Some(30.0)),
        ];
        let m = growth_metrics(Some(20.0), &rows).unwrap();
        assert_eq!(m.peg, f64::INFINITY);
        // pegScore 0, niScore 20
        assert_eq!(financial_score(Some(m)), Signal::Available(10.0));
    }

    #[test]
    fn infinite_per_still_scores() {
        let rows = vec![
            fin_row(2019, Some(3_000.0), Some(10.0)),
            fin_row(2020, Some(4_000.0), Some(20.0)),
            fin_row(2021, Some(5_000.0), Some(30.0)),
        ];
        let m = growth_metrics(Some(f64::INFINITY), &rows).unwrap();
        assert_eq!(financial_score(Some(m)), Signal::Available(10.0));
    }

    #[test]
    fn financial_score_is_insufficient_without_peg() {
        assert_eq!(financial_score(None), Signal::Insufficient);
    }

    #[test]
    fn financial_score_combines_peg_and_net_income_growth() {
        let rising = GrowthMetrics {
            peg: 0.16,
            ni_growth_1yr: 25.0,
            ni_growth_2yr: 20.0,
        };
        assert_eq!(financial_score(Some(rising)), Signal::Available(60.0));

        let slowing = GrowthMetrics {
            peg: 0.16,
            ni_growth_1yr: 15.0,
            ni_growth_2yr: 20.0,
        };
        assert_eq!(financial_score(Some(slowing)), Signal::Available(57.5));

        let collapsing = GrowthMetrics {
            peg: 0.8,
            ni_growth_1yr: -40.0,
            ni_growth_2yr: 10.0,
        };
        assert_eq!(financial_score(Some(collapsing)), Signal::Available(40.0));

        let expensive = GrowthMetrics {
            peg: 1.5,
            ni_growth_1yr: 150.0,
            ni_growth_2yr: 120.0,
        };
        assert_eq!(financial_score(Some(expensive)), Signal::Available(50.0));
    }

    #[test]
    fn composite_is_insufficient_iff_a_sub_score_is() {
        let a = Signal::Available(60.0);
        assert_eq!(composite_score(30.0, &a, &a), Signal::Available(50));
        assert_eq!(
            composite_score(30.0, &Signal::Insufficient, &a),
            Signal::Insufficient
        );
        assert_eq!(
            composite_score(30.0, &a, &Signal::Insufficient),
            Signal::Insufficient
        );
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round1(12.25), 12.3);
        assert_eq!(round1(-0.04), 0.0);
        assert_eq!(round2(18.065), 18.07);
    }
}
