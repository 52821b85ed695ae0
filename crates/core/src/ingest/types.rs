use serde::Deserialize;

/// Realtime quote polling response: `result.areas[].datas[]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeResponse {
    pub result: Option<RealtimeResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeResult {
    #[serde(default)]
    pub areas: Vec<RealtimeArea>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeArea {
    #[serde(default)]
    pub datas: Vec<RealtimeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeItem {
    /// Stock code.
    pub cd: String,
    /// Current trade price.
    pub nv: Option<f64>,
    /// Previous close.
    pub sv: Option<f64>,
    /// Change amount. Index quotes scale this and `nv` by 100.
    pub cv: Option<f64>,
    /// Absolute change rate in percent.
    pub cr: Option<f64>,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
}
