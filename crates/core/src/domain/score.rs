use crate::domain::signal::Signal;
use chrono::NaiveDate;
use serde::Serialize;

/// Scores computed for one stock on one scoring run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub stock_id: String,
    pub date: NaiveDate,
    pub credibility_score: f64,
    pub popularity_score: Signal<f64>,
    pub financial_score: Signal<f64>,
    pub composite_score: Signal<i32>,
}

/// Latest score row as kept by the score store. `None` columns mean the sub-score had
/// insufficient data on that run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredScore {
    pub stock_id: String,
    pub score_date: NaiveDate,
    pub credibility: f64,
    pub popularity: Option<f64>,
    pub financial: Option<f64>,
    pub composite: Option<i32>,
}

impl From<&ScoreResult> for StoredScore {
    fn from(r: &ScoreResult) -> Self {
        Self {
            stock_id: r.stock_id.clone(),
            score_date: r.date,
            credibility: r.credibility_score,
            popularity: r.popularity_score.available(),
            financial: r.financial_score.available(),
            composite: r.composite_score.available(),
        }
    }
}
