//! Trading calendar: weekdays minus configured holidays.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::domain::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Parse a comma separated list of `YYYY-MM-DD` dates, as found in the
    /// `[calendar] holidays` setting.
    pub fn from_list(list: &str) -> Result<Self, EngineError> {
        let mut holidays = BTreeSet::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let date = NaiveDate::parse_from_str(item, "%Y-%m-%d").map_err(|e| {
                EngineError::ConfigInvalid {
                    section: "calendar".into(),
                    key: "holidays".into(),
                    reason: format!("'{item}': {e}"),
                }
            })?;
            holidays.insert(date);
        }
        Ok(Self { holidays })
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }

    /// Trading days strictly after `after`, up to and including `until`.
    pub fn trading_days_between(&self, after: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
        after
            .iter_days()
            .skip(1)
            .take_while(|d| *d <= until)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }

    /// Latest trading day on or before `date`. `None` only when the walk
    /// runs off the start of the date range.
    pub fn last_trading_day_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        // every 7 days hold 5 weekdays, so a non-trading run covers at most
        // `holidays` of them
        let bound = 7 * (self.holidays.len() + 1);
        let mut day = date;
        for _ in 0..bound {
            if self.is_trading_day(day) {
                return Some(day);
            }
            day = day.pred_opt()?;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_are_not_trading_days() {
        let cal = TradingCalendar::default();
        assert!(cal.is_trading_day(d(2024, 3, 1))); // Friday
        assert!(!cal.is_trading_day(d(2024, 3, 2)));
        assert!(!cal.is_trading_day(d(2024, 3, 3)));
        assert!(cal.is_trading_day(d(2024, 3, 4)));
    }

    #[test]
    fn holidays_are_skipped() {
        let cal = TradingCalendar::from_list("2024-12-25, 2024-12-26").unwrap();
        assert!(!cal.is_trading_day(d(2024, 12, 25)));
        assert_eq!(cal.holidays().count(), 2);
        let days = cal.trading_days_between(d(2024, 12, 24), d(2024, 12, 31));
        assert_eq!(days, vec![d(2024, 12, 27), d(2024, 12, 30), d(2024, 12, 31)]);
    }

    #[test]
    fn range_excludes_start_and_includes_end() {
        let cal = TradingCalendar::default();
        let days = cal.trading_days_between(d(2024, 3, 4), d(2024, 3, 6));
        assert_eq!(days, vec![d(2024, 3, 5), d(2024, 3, 6)]);
        assert!(cal.trading_days_between(d(2024, 3, 6), d(2024, 3, 6)).is_empty());
        assert!(cal.trading_days_between(d(2024, 3, 6), d(2024, 3, 1)).is_empty());
    }

    #[test]
    fn bad_holiday_rejected() {
        let err = TradingCalendar::from_list("2024-13-01").unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { .. }));
        assert_eq!(TradingCalendar::from_list("").unwrap(), TradingCalendar::default());
    }

    #[test]
    fn last_trading_day_rolls_back_over_weekend() {
        let cal = TradingCalendar::default();
        assert_eq!(cal.last_trading_day_on_or_before(d(2024, 3, 3)), Some(d(2024, 3, 1)));
        assert_eq!(cal.last_trading_day_on_or_before(d(2024, 3, 4)), Some(d(2024, 3, 4)));
    }

    #[test]
    fn last_trading_day_spans_long_closures() {
        // six weeks of weekday holidays
        let closed = d(2024, 3, 4)
            .iter_days()
            .take(42)
            .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun));
        let cal = TradingCalendar::new(closed);
        assert_eq!(cal.last_trading_day_on_or_before(d(2024, 4, 14)), Some(d(2024, 3, 1)));
        assert_eq!(cal.last_trading_day_on_or_before(d(2024, 4, 15)), Some(d(2024, 4, 15)));
    }
}
