use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One analyst publication as held by the report store.
///
/// Field aliases accept the camelCase keys used by older table exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub date: NaiveDate,
    #[serde(alias = "stockId")]
    pub stock_id: String,
    #[serde(alias = "stockName")]
    pub stock_name: String,
    #[serde(default, alias = "reportName")]
    pub report_name: String,
    #[serde(default)]
    pub analyst: String,
    pub firm: String,
    /// Raw target price text. "0" means the report carries no target.
    #[serde(alias = "priceGoal")]
    pub price_goal: String,
    #[serde(alias = "reportIdx", alias = "reportIndex")]
    pub report_index: String,
    #[serde(flatten)]
    pub sector: SectorPath,
}

/// WICS classification, coarse to fine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectorPath {
    #[serde(rename = "large_sector", alias = "lSector")]
    pub large: String,
    #[serde(default, rename = "medium_sector", alias = "mSector")]
    pub medium: String,
    #[serde(default, rename = "small_sector", alias = "sSector")]
    pub small: String,
}

impl Report {
    pub fn validate(&self) -> anyhow::Result<()> {
        let id = self.stock_id.trim();
        anyhow::ensure!(
            id.len() == 6 && id.bytes().all(|b| b.is_ascii_digit()),
            "stock_id must be a 6-digit code (got {:?})",
            self.stock_id
        );
        anyhow::ensure!(!self.stock_name.trim().is_empty(), "stock_name must be non-empty");
        anyhow::ensure!(!self.firm.trim().is_empty(), "firm must be non-empty");
        anyhow::ensure!(
            !self.report_index.trim().is_empty(),
            "report_index must be non-empty"
        );
        anyhow::ensure!(
            !self.sector.large.trim().is_empty(),
            "large_sector must be non-empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_legacy_camel_case_keys() {
        let v = json!({
            "date": "2021-06-01",
            "stockId": "005930",
            "stockName": "삼성전자",
            "reportName": "메모리 업황 회복",
            "analyst": "홍길동",
            "firm": "한국투자증권",
            "priceGoal": "100000",
            "reportIdx": "602114",
            "lSector": "IT",
            "mSector": "반도체",
            "sSector": "반도체와반도체장비"
        });

        let r: Report = serde_json::from_value(v).unwrap();
        assert_eq!(r.stock_id, "005930");
        assert_eq!(r.report_index, "602114");
        assert_eq!(r.sector.large, "IT");
        assert_eq!(r.sector.small, "반도체와반도체장비");
        r.validate().unwrap();
    }

    #[test]
    fn rejects_non_numeric_stock_id() {
        let v = json!({
            "date": "2021-06-01",
            "stock_id": "A05930",
            "stock_name": "삼성전자",
            "firm": "KB",
            "price_goal": "0",
            "report_index": "1",
            "large_sector": "IT"
        });
        let r: Report = serde_json::from_value(v).unwrap();
        assert!(r.validate().is_err());
    }
}
