use serde::Serialize;

/// WICS large-sector names as stored on reports.
pub const WICS_LARGE_SECTORS: [&str; 10] = [
    "에너지",
    "소재",
    "산업재",
    "경기관련소비재",
    "필수소비재",
    "건강관리",
    "금융",
    "IT",
    "커뮤니케이션서비스",
    "유틸리티",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorStock {
    pub stock_id: String,
    pub stock_name: String,
    pub small_sector: String,
    pub trade_price: f64,
    pub change_rate: Option<f64>,
    pub price_target_average: i64,
    pub price_target_count: usize,
    /// Percent upside to the average target, one decimal.
    pub expected_yield: f64,
    /// Latest stored composite score, if any.
    pub score: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorYield {
    pub name: String,
    pub average_yield: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorRanking {
    pub sector_name: String,
    pub stocks: Vec<SectorStock>,
    pub average_expected_yield: f64,
    pub top3_sectors: Vec<SectorYield>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectorOverview {
    Ranked(SectorRanking),
    NoData { sector_name: String },
}
