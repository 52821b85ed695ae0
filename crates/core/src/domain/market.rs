use serde::Serialize;

/// Domestic indices polled from the realtime feed, with their display names.
pub const KR_INDICES: [(&str, &str); 3] = [
    ("KOSPI", "코스피"),
    ("KOSDAQ", "코스닥"),
    ("KPI200", "코스피 200"),
];

pub fn kr_index_name(code: &str) -> Option<&'static str> {
    KR_INDICES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketIndex {
    pub code: String,
    pub name: String,
    pub trade_price: f64,
    pub change_price: Option<f64>,
    /// Daily change in percent, as reported.
    pub change_rate: Option<f64>,
}
