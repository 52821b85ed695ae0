use chrono::NaiveDate;
use serde::{Serialize, Serializer};

pub const INSUFFICIENT_DATA: &str = "insufficient-data";

/// A value that may be missing because its source had too little history or was unreachable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal<T> {
    Available(T),
    Insufficient,
}

impl<T> Signal<T> {
    pub fn is_insufficient(&self) -> bool {
        matches!(self, Signal::Insufficient)
    }

    pub fn available(self) -> Option<T> {
        match self {
            Signal::Available(v) => Some(v),
            Signal::Insufficient => None,
        }
    }

    pub fn as_ref(&self) -> Signal<&T> {
        match self {
            Signal::Available(v) => Signal::Available(v),
            Signal::Insufficient => Signal::Insufficient,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U> {
        match self {
            Signal::Available(v) => Signal::Available(f(v)),
            Signal::Insufficient => Signal::Insufficient,
        }
    }
}

impl<T: Serialize> Serialize for Signal<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Signal::Available(v) => v.serialize(serializer),
            Signal::Insufficient => serializer.serialize_str(INSUFFICIENT_DATA),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Up,
    Down,
}

/// Price direction over the last 5, 10 and 20 sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Momentum {
    pub day5: Direction,
    pub day10: Direction,
    pub day20: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Popularity {
    /// Last-5-session volume over the prior 5 sessions, minus one.
    pub volume_increase_ratio: f64,
    pub momentum: Momentum,
}

/// Live quote fields as returned by the batch quote feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub stock_id: String,
    pub trade_price: f64,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
    /// Signed daily change in percent.
    pub change_rate: Option<f64>,
}

/// Ratios keep infinities from zero denominators; only `0 / 0` is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Valuation {
    pub trade_price: f64,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
}

impl Valuation {
    pub fn from_quote(q: &Quote) -> Self {
        Self {
            trade_price: q.trade_price,
            eps: q.eps,
            bps: q.bps,
            per: q.eps.and_then(|eps| not_nan(q.trade_price / eps)),
            pbr: q.bps.and_then(|bps| not_nan(q.trade_price / bps)),
            roe: match (q.eps, q.bps) {
                (Some(eps), Some(bps)) => not_nan(eps / bps),
                _ => None,
            },
        }
    }
}

/// One fiscal year of the annual statement table. Cells that fail to parse are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinancialRow {
    pub year: i32,
    pub revenue: Option<f64>,
    pub revenue_delta: Option<f64>,
    pub op_income: Option<f64>,
    pub op_income_delta: Option<f64>,
    pub net_income: Option<f64>,
    pub net_income_delta: Option<f64>,
    pub eps: Option<f64>,
    pub ev_ebitda: Option<f64>,
    pub debt_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
}

pub(crate) fn not_nan(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}
