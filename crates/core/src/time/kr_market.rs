use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc, Weekday};
use std::collections::HashSet;

const KST_OFFSET_SECS: i32 = 9 * 3600;

// Daily chart data for a session is final only after the KRX close (15:30 KST).
const CLOSE_CUTOFF_HOUR_KST: u32 = 16;
const CLOSE_CUTOFF_MINUTE_KST: u32 = 0;

/// Fixed-date KRX closures (month, day). Lunar holidays come from configuration.
const FIXED_HOLIDAYS: [(u32, u32); 8] = [
    (1, 1),
    (3, 1),
    (5, 5),
    (6, 6),
    (8, 15),
    (10, 3),
    (10, 9),
    (12, 25),
];

/// KRX trading calendar: weekends, fixed-date holidays and configured extra closures.
#[derive(Debug, Clone, Default)]
pub struct MarketCalendar {
    extra_holidays: HashSet<NaiveDate>,
}

impl MarketCalendar {
    pub fn new(extra_holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            extra_holidays: extra_holidays.into_iter().collect(),
        }
    }

    /// Parses `YYYY-MM-DD` entries; unparsable entries are skipped with a warning.
    pub fn from_list(entries: &[String]) -> Self {
        let dates = entries.iter().filter_map(|s| {
            match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                Ok(d) => Some(d),
                Err(err) => {
                    tracing::warn!(entry = %s, error = %err, "ignoring invalid market holiday");
                    None
                }
            }
        });
        Self::new(dates)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        let fixed = FIXED_HOLIDAYS.contains(&(date.month(), date.day()));
        !(weekend || fixed || self.extra_holidays.contains(&date))
    }

    /// Latest trading day on or before `date`.
    pub fn previous_trading_day(&self, mut date: NaiveDate) -> NaiveDate {
        while !self.is_trading_day(date) {
            date -= Duration::days(1);
        }
        date
    }

    /// Scoring date for a run: the explicit `YYYY-MM-DD` argument, or the latest KST trading
    /// day whose close has passed at `now_utc`.
    pub fn resolve_as_of_date(
        &self,
        as_of_date_arg: Option<&str>,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<NaiveDate> {
        if let Some(s) = as_of_date_arg {
            return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .with_context(|| format!("invalid as-of date {s:?} (expected YYYY-MM-DD)"));
        }

        let now_kst = now_utc.with_timezone(&kst()?);
        let cutoff_reached =
            (now_kst.hour(), now_kst.minute()) >= (CLOSE_CUTOFF_HOUR_KST, CLOSE_CUTOFF_MINUTE_KST);
        let mut date = now_kst.date_naive();
        if !cutoff_reached {
            date -= Duration::days(1);
        }
        Ok(self.previous_trading_day(date))
    }
}

/// Calendar date in Korea at `now_utc`.
pub fn kst_today(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    Ok(now_utc.with_timezone(&kst()?).date_naive())
}

/// First day of a trailing window of `days` ending at `as_of`.
pub fn window_start(as_of: NaiveDate, days: i64) -> NaiveDate {
    as_of - Duration::days(days.max(0))
}

fn kst() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(KST_OFFSET_SECS).context("invalid KST offset")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let cal = MarketCalendar::default();
        assert_eq!(cal.resolve_as_of_date(Some("2021-06-01"), now).unwrap(), d(2021, 6, 1));
        assert!(cal.resolve_as_of_date(Some("06/01/2021"), now).is_err());
    }

    #[test]
    fn before_close_on_monday_rolls_back_to_friday() {
        // 2026-01-05 06:00 UTC = 15:00 KST
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 6, 0, 0).unwrap();
        let got = MarketCalendar::default().resolve_as_of_date(None, now).unwrap();
        assert_eq!(got, d(2026, 1, 2));
    }

    #[test]
    fn after_close_uses_same_day() {
        // 2026-01-05 08:00 UTC = 17:00 KST
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let got = MarketCalendar::default().resolve_as_of_date(None, now).unwrap();
        assert_eq!(got, d(2026, 1, 5));
    }

    #[test]
    fn skips_fixed_and_configured_holidays() {
        // 2021-03-01 (Mon) is Independence Movement Day; 2021-02-26 configured closed.
        let cal = MarketCalendar::from_list(&["2021-02-26".to_string(), "bogus".to_string()]);
        assert!(!cal.is_trading_day(d(2021, 3, 1)));
        assert_eq!(cal.previous_trading_day(d(2021, 3, 1)), d(2021, 2, 25));
        assert!(cal.is_trading_day(d(2021, 3, 2)));
    }

    #[test]
    fn kst_date_crosses_midnight_before_utc() {
        // 2021-05-31 16:30 UTC = 2021-06-01 01:30 KST
        let now = Utc.with_ymd_and_hms(2021, 5, 31, 16, 30, 0).unwrap();
        assert_eq!(kst_today(now).unwrap(), d(2021, 6, 1));
        assert_eq!(window_start(d(2021, 6, 1), 91), d(2021, 3, 2));
    }
}
