use anyhow::Context;
use kconsensus_core::domain::report::Report;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct ReportBatch {
    pub reports: Vec<Report>,
    /// Records that failed to decode or validate.
    pub rejected: usize,
}

/// Accepts a JSON array of reports or one report object per line. Invalid records are
/// logged and skipped; repeated `(firm, report_index)` pairs keep the first record.
pub fn parse_reports(text: &str) -> anyhow::Result<ReportBatch> {
    let trimmed = text.trim_start();
    let values: Vec<(usize, serde_json::Value)> = if trimmed.starts_with('[') {
        let arr: Vec<serde_json::Value> =
            serde_json::from_str(trimmed).context("invalid JSON array of reports")?;
        arr.into_iter().enumerate().map(|(i, v)| (i + 1, v)).collect()
    } else {
        let mut out = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str(line)
                .with_context(|| format!("line {} is not valid JSON", i + 1))?;
            out.push((i + 1, v));
        }
        out
    };

    let mut batch = ReportBatch::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for (pos, value) in values {
        let report = serde_json::from_value::<Report>(value)
            .context("record does not match the report shape")
            .and_then(|r| r.validate().map(|()| r));
        match report {
            Ok(r) => {
                let key = (r.firm.trim().to_string(), r.report_index.trim().to_string());
                if seen.insert(key) {
                    batch.reports.push(r);
                }
            }
            Err(err) => {
                batch.rejected += 1;
                tracing::warn!(record = pos, error = %format!("{err:#}"), "skipping report record");
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(idx: &str, goal: &str) -> serde_json::Value {
        json!({
            "date": "2021-06-01",
            "stock_id": "011070",
            "stock_name": "LG이노텍",
            "report_name": "카메라 모듈 호조",
            "analyst": "홍길동",
            "firm": "A증권",
            "price_goal": goal,
            "report_index": idx,
            "large_sector": "IT",
            "medium_sector": "하드웨어",
            "small_sector": "전자장비와기기"
        })
    }

    #[test]
    fn parses_json_array_and_dedupes() {
        let text = serde_json::to_string(&vec![
            record("1", "250000"),
            record("2", "0"),
            record("1", "260000"),
        ])
        .unwrap();
        let batch = parse_reports(&text).unwrap();
        assert_eq!(batch.reports.len(), 2);
        assert_eq!(batch.rejected, 0);
        assert_eq!(batch.reports[0].price_goal, "250000");
        assert_eq!(batch.reports[1].sector.small, "전자장비와기기");
    }

    #[test]
    fn parses_json_lines_and_rejects_invalid_records() {
        let mut bad = record("3", "1000");
        bad["stock_id"] = json!("11070");
        let text = format!(
            "{}\n\n{}\n{}\n",
            record("1", "250000"),
            json!({"stockId": "005930", "date": "2021-06-02"}),
            bad
        );
        let batch = parse_reports(&text).unwrap();
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.rejected, 2);
    }

    #[test]
    fn broken_line_fails_the_import() {
        assert!(parse_reports("{\"date\": \n").is_err());
    }
}
