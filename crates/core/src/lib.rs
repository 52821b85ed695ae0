pub mod aggregate;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod score;
pub mod sector;
pub mod stock;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    const DEFAULT_QUOTE_URL: &str = "https://polling.finance.naver.com/api/realtime";
    const DEFAULT_CHART_URL: &str = "https://fchart.stock.naver.com/sise.nhn";
    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_HTTP_RETRIES: u32 = 3;
    const DEFAULT_ENRICH_CONCURRENCY: usize = 4;
    const DEFAULT_QUOTE_BATCH_SIZE: usize = 100;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub quote_url: String,
        pub chart_url: String,
        /// Financial statement page; `{stock_id}` is replaced by the 6-digit code.
        pub financials_url_template: Option<String>,
        pub http_timeout_secs: u64,
        pub http_retries: u32,
        pub enrich_concurrency: usize,
        pub quote_batch_size: usize,
        /// Large (WICS) sectors scanned by the daily scoring run. Empty means all.
        pub score_sectors: Vec<String>,
        pub score_window_days: i64,
        /// Extra KRX closures (`YYYY-MM-DD`), e.g. lunar holidays.
        pub market_holidays: Vec<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                quote_url: env_string("NAVER_QUOTE_URL")
                    .unwrap_or_else(|| DEFAULT_QUOTE_URL.to_string()),
                chart_url: env_string("NAVER_CHART_URL")
                    .unwrap_or_else(|| DEFAULT_CHART_URL.to_string()),
                financials_url_template: env_string("FINANCIALS_URL_TEMPLATE"),
                http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                http_retries: env_parse("HTTP_RETRIES")?.unwrap_or(DEFAULT_HTTP_RETRIES),
                enrich_concurrency: env_parse("ENRICH_CONCURRENCY")?
                    .unwrap_or(DEFAULT_ENRICH_CONCURRENCY),
                quote_batch_size: env_parse("QUOTE_BATCH_SIZE")?
                    .unwrap_or(DEFAULT_QUOTE_BATCH_SIZE),
                score_sectors: env_string("SCORE_SECTORS")
                    .map(|s| parse_list(&s))
                    .unwrap_or_default(),
                score_window_days: env_parse("SCORE_WINDOW_DAYS")?
                    .unwrap_or(crate::aggregate::SCORING_WINDOW_DAYS),
                market_holidays: env_string("KR_MARKET_HOLIDAYS")
                    .map(|s| parse_list(&s))
                    .unwrap_or_default(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_financials_url_template(&self) -> anyhow::Result<&str> {
            self.financials_url_template
                .as_deref()
                .context("FINANCIALS_URL_TEMPLATE is required")
        }
    }

    fn env_string(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match env_string(key) {
            Some(s) => {
                let v = s
                    .trim()
                    .parse::<T>()
                    .with_context(|| format!("{key} is not valid: {s}"))?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    pub fn parse_list(s: &str) -> Vec<String> {
        s.split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect()
    }

}
