use crate::config::Settings;
use crate::domain::market::{kr_index_name, MarketIndex, KR_INDICES};
use crate::domain::signal::{DailyBar, Quote};
use crate::error::SourceError;
use crate::ingest::provider::{DailySeriesFeed, HttpSource, IndexFeed, QuoteFeed};
use crate::ingest::types::{RealtimeItem, RealtimeResponse};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;

const QUOTE_SOURCE: &str = "naver_realtime";
const CHART_SOURCE: &str = "naver_chart";

/// Batch realtime quotes (`query=SERVICE_ITEM:005930,000660`).
#[derive(Debug, Clone)]
pub struct NaverQuoteClient {
    source: HttpSource,
    url: String,
}

impl NaverQuoteClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            source: HttpSource::from_settings(settings, QUOTE_SOURCE)?,
            url: settings.quote_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl QuoteFeed for NaverQuoteClient {
    fn source_name(&self) -> &'static str {
        self.source.name()
    }

    async fn fetch_current_quotes(&self, stock_ids: &[String]) -> Result<HashMap<String, Quote>> {
        if stock_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = format!("SERVICE_ITEM:{}", stock_ids.join(","));
        let text = self
            .source
            .get_text(&self.url, &[("query", query)])
            .await
            .context("realtime quote request failed")?;
        parse_realtime_quotes(&text)
    }
}

#[async_trait::async_trait]
impl IndexFeed for NaverQuoteClient {
    fn source_name(&self) -> &'static str {
        self.source.name()
    }

    async fn fetch_kr_indices(&self) -> Result<Vec<MarketIndex>> {
        let codes: Vec<&str> = KR_INDICES.iter().map(|(code, _)| *code).collect();
        let query = format!("SERVICE_INDEX:{}", codes.join(","));
        let text = self
            .source
            .get_text(&self.url, &[("query", query)])
            .await
            .context("realtime index request failed")?;
        parse_realtime_indices(&text)
    }
}

fn realtime_items(text: &str) -> Result<Vec<RealtimeItem>> {
    let parsed = serde_json::from_str::<RealtimeResponse>(text).map_err(|e| {
        SourceError::malformed(QUOTE_SOURCE, format!("invalid realtime response: {e}"))
    })?;
    let areas = parsed.result.map(|r| r.areas).unwrap_or_default();
    Ok(areas.into_iter().flat_map(|a| a.datas).collect())
}

pub fn parse_realtime_quotes(text: &str) -> Result<HashMap<String, Quote>> {
    let mut out = HashMap::new();
    for item in realtime_items(text)? {
        match quote_from_item(&item) {
            Some(q) => {
                out.insert(q.stock_id.clone(), q);
            }
            None => {
                tracing::debug!(
                    stock_id = %item.cd,
                    "realtime quote without trade price; skipping"
                );
            }
        }
    }
    Ok(out)
}

fn quote_from_item(item: &RealtimeItem) -> Option<Quote> {
    let trade_price = item.nv.filter(|v| *v > 0.0)?;
    // The feed reports an unsigned rate; a price below the previous close is a decline.
    let change_rate = item.cr.map(|cr| match item.sv {
        Some(prev) if prev < trade_price => cr.abs(),
        Some(_) => -cr.abs(),
        None => cr,
    });

    Some(Quote {
        stock_id: item.cd.trim().to_string(),
        trade_price,
        eps: item.eps,
        bps: item.bps,
        change_rate,
    })
}

/// Index levels in feed order. The feed sends index price and change scaled by 100.
pub fn parse_realtime_indices(text: &str) -> Result<Vec<MarketIndex>> {
    Ok(realtime_items(text)?
        .into_iter()
        .filter_map(|item| {
            let code = item.cd.trim().to_string();
            let trade_price = item.nv? / 100.0;
            Some(MarketIndex {
                name: kr_index_name(&code).map_or_else(|| code.clone(), str::to_string),
                code,
                trade_price,
                change_price: item.cv.map(|cv| cv / 100.0),
                change_rate: item.cr,
            })
        })
        .collect())
}

/// Daily chart feed (`sise.nhn`), XML items of `date|open|high|low|close|volume`.
#[derive(Debug, Clone)]
pub struct NaverChartClient {
    source: HttpSource,
    url: String,
}

impl NaverChartClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            source: HttpSource::from_settings(settings, CHART_SOURCE)?,
            url: settings.chart_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl DailySeriesFeed for NaverChartClient {
    fn source_name(&self) -> &'static str {
        self.source.name()
    }

    async fn fetch_daily_series(&self, stock_id: &str, count: usize) -> Result<Vec<DailyBar>> {
        let query = [
            ("symbol", stock_id.to_string()),
            ("timeframe", "day".to_string()),
            ("count", count.to_string()),
            ("requestType", "0".to_string()),
        ];
        let text = self
            .source
            .get_text(&self.url, &query)
            .await
            .with_context(|| format!("daily chart request failed for {stock_id}"))?;

        let mut bars = parse_chart_items(&text)?;
        if bars.len() > count {
            let excess = bars.len() - count;
            bars.drain(..excess);
        }
        Ok(bars)
    }
}

/// Parses chart XML into bars sorted oldest first. Items that fail to parse are dropped.
pub fn parse_chart_items(xml: &str) -> Result<Vec<DailyBar>> {
    let mut reader = Reader::from_str(xml);
    let mut bars = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"item" => {
                let attr = e.try_get_attribute("data").map_err(|err| {
                    SourceError::malformed(CHART_SOURCE, format!("bad item attribute: {err}"))
                })?;
                let Some(attr) = attr else {
                    continue;
                };
                let data = attr.unescape_value().map_err(|err| {
                    SourceError::malformed(CHART_SOURCE, format!("bad item data: {err}"))
                })?;
                match parse_chart_row(&data) {
                    Some(bar) => bars.push(bar),
                    None => tracing::debug!(row = %data, "unparsable chart row; skipping"),
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(SourceError::malformed(
                    CHART_SOURCE,
                    format!("invalid chart xml at {}: {err}", reader.buffer_position()),
                )
                .into());
            }
            _ => {}
        }
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn parse_chart_row(data: &str) -> Option<DailyBar> {
    let parts: Vec<&str> = data.split('|').map(|s| s.trim()).collect();
    if parts.len() < 6 {
        return None;
    }
    let date = NaiveDate::parse_from_str(parts[0], "%Y%m%d").ok()?;
    let close = parts[4].parse::<f64>().ok()?;
    let volume = parts[5].parse::<f64>().ok()?;
    Some(DailyBar {
        date,
        close,
        volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{source_error_kind, SourceErrorKind};
    use serde_json::json;

    #[test]
    fn parses_realtime_quotes_with_signed_change_rate() {
        let body = json!({
            "resultCode": "success",
            "result": {
                "areas": [{
                    "name": "SERVICE_ITEM",
                    "datas": [
                        {"cd": "005930", "nm": "삼성전자", "nv": 81000, "sv": 80000, "cr": 1.25, "eps": 5777, "bps": 39406},
                        {"cd": "000660", "nm": "SK하이닉스", "nv": 120000, "sv": 125000, "cr": 4.0, "eps": 6532, "bps": 71275},
                        {"cd": "999999", "nm": "거래정지", "nv": 0}
                    ]
                }]
            }
        })
        .to_string();

        let quotes = parse_realtime_quotes(&body).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes["005930"].trade_price, 81_000.0);
        assert_eq!(quotes["005930"].change_rate, Some(1.25));
        assert_eq!(quotes["000660"].change_rate, Some(-4.0));
        assert_eq!(quotes["000660"].eps, Some(6532.0));
        assert!(!quotes.contains_key("999999"));
    }

    #[test]
    fn parses_index_levels_with_display_names() {
        let body = json!({
            "result": {
                "areas": [{
                    "name": "SERVICE_INDEX",
                    "datas": [
                        {"cd": "KOSPI", "nv": 324960, "cv": -1523, "cr": -0.47},
                        {"cd": "KOSDAQ", "nv": 101045, "cv": 812, "cr": 0.81},
                        {"cd": "KPI200", "nv": 43317},
                        {"cd": "KRX100"}
                    ]
                }]
            }
        })
        .to_string();

        let indices = parse_realtime_indices(&body).unwrap();
        assert_eq!(indices.len(), 3);
        assert_eq!(indices[0].name, "코스피");
        assert!((indices[0].trade_price - 3249.6).abs() < 1e-9);
        assert!((indices[0].change_price.unwrap() + 15.23).abs() < 1e-9);
        assert_eq!(indices[0].change_rate, Some(-0.47));
        assert_eq!(indices[1].name, "코스닥");
        assert_eq!(indices[2].name, "코스피 200");
        assert_eq!(indices[2].change_price, None);
    }

    #[test]
    fn malformed_realtime_body_is_reported_as_malformed() {
        let err = parse_realtime_quotes("<html>maintenance</html>").unwrap_err();
        assert_eq!(source_error_kind(&err), Some(SourceErrorKind::Malformed));
    }

    #[test]
    fn parses_chart_items_oldest_first() {
        let xml = r#"<?xml version="1.0" encoding="EUC-KR" ?>
<protocol>
  <chartdata symbol="005930" name="Samsung" count="3" timeframe="day" precision="0" origintime="19900103">
    <item data="20210602|80400|81900|80300|80800|15000000" />
    <item data="20210601|80500|81300|80100|80600|13321324" />
    <item data="2021xx03|0|0|0|bad|0" />
    <item data="20210603|81300|82600|81000|82600|18000000" />
  </chartdata>
</protocol>"#;

        let bars = parse_chart_items(xml).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        assert_eq!(bars[0].close, 80_600.0);
        assert_eq!(bars[2].close, 82_600.0);
        assert_eq!(bars[2].volume, 18_000_000.0);
    }
}
