use crate::config::Settings;
use crate::domain::signal::FinancialRow;
use crate::error::SourceError;
use crate::ingest::provider::{FinancialFeed, HttpSource};
use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};

const SOURCE: &str = "financial_table";

/// Annual statement table rendered as HTML, one fiscal year per `tbody tr`.
///
/// Column order: year, revenue, revenue growth, operating income, operating income growth,
/// net income, net income growth, EPS, (three unused), EV/EBITDA, debt ratio.
#[derive(Debug, Clone)]
pub struct FinancialTableClient {
    source: HttpSource,
    url_template: String,
}

impl FinancialTableClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url_template = settings.require_financials_url_template()?.to_string();
        anyhow::ensure!(
            url_template.contains("{stock_id}"),
            "FINANCIALS_URL_TEMPLATE must contain {{stock_id}}"
        );
        Ok(Self {
            source: HttpSource::from_settings(settings, SOURCE)?,
            url_template,
        })
    }

    fn url(&self, stock_id: &str) -> String {
        self.url_template.replace("{stock_id}", stock_id)
    }
}

#[async_trait::async_trait]
impl FinancialFeed for FinancialTableClient {
    fn source_name(&self) -> &'static str {
        self.source.name()
    }

    async fn fetch_annual_financials(&self, stock_id: &str) -> Result<Vec<FinancialRow>> {
        let html = self
            .source
            .get_text(&self.url(stock_id), &[])
            .await
            .with_context(|| format!("financial table request failed for {stock_id}"))?;
        parse_financial_table(&html)
    }
}

pub fn parse_financial_table(html: &str) -> Result<Vec<FinancialRow>> {
    let doc = Html::parse_document(html);
    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("td")?;

    let mut rows = Vec::new();
    for tr in doc.select(&row_sel) {
        let cells: Vec<String> = tr.select(&cell_sel).map(cell_text).collect();
        let Some(year) = cells.first().and_then(|c| parse_year(c)) else {
            continue;
        };
        let num = |i: usize| cells.get(i).and_then(|c| parse_cell_number(c));

        rows.push(FinancialRow {
            year,
            revenue: num(1),
            revenue_delta: num(2),
            op_income: num(3),
            op_income_delta: num(4),
            net_income: num(5),
            net_income_delta: num(6),
            eps: num(7),
            ev_ebitda: num(11),
            debt_ratio: num(12),
        });
    }

    rows.sort_by_key(|r| r.year);
    Ok(rows)
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s)
        .map_err(|e| SourceError::malformed(SOURCE, format!("bad selector {s}: {e:?}")).into())
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// "2020(A)" / "2021/12" / "2022" -> year.
fn parse_year(s: &str) -> Option<i32> {
    let head = s.split(['(', '/', '.']).next()?.trim();
    head.parse::<i32>().ok().filter(|y| (1900..=2200).contains(y))
}

/// Thousands separators, unit suffixes and percent signs are stripped.
pub fn parse_cell_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '배' | '원' | '%' | ' '))
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
