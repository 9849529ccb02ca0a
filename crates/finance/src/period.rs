//! Reporting windows.
//!
//! Windows are inclusive on both ends: a record stamped exactly at either
//! boundary belongs to the period. Callers pass the reference instant
//! explicitly — nothing in here reads a clock.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::ValueObject;

/// An inclusive-inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// The calendar-month window for (year, month). `None` for an invalid
    /// month number.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        let last = next_first.pred_opt()?;
        Some(Self::new(start_of_day(first), end_of_day(last)))
    }
}

impl ValueObject for DateWindow {}

/// Calendar period keywords offered by the reporting surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportingPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ReportingPeriod {
    /// The calendar window containing `now`. Weeks run Sunday through
    /// Saturday.
    pub fn window_containing(self, now: DateTime<Utc>) -> DateWindow {
        let today = now.date_naive();
        match self {
            ReportingPeriod::Daily => DateWindow::new(start_of_day(today), end_of_day(today)),
            ReportingPeriod::Weekly => {
                let back = i64::from(today.weekday().num_days_from_sunday());
                let sunday = today - Duration::days(back);
                DateWindow::new(start_of_day(sunday), end_of_day(sunday + Duration::days(6)))
            }
            ReportingPeriod::Monthly => {
                // `today` is a valid date, so its month window always exists.
                DateWindow::month(today.year(), today.month())
                    .unwrap_or_else(|| DateWindow::new(start_of_day(today), end_of_day(today)))
            }
            ReportingPeriod::Yearly => {
                let jan1 = today.with_ordinal(1).unwrap_or(today);
                let dec31 = NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today);
                DateWindow::new(start_of_day(jan1), end_of_day(dec31))
            }
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    // Last representable instant of the day; keeps the window end inclusive.
    let end = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    date.and_time(end).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let window = DateWindow::month(2024, 1).unwrap();
        assert!(window.contains(at("2024-01-01T00:00:00Z")));
        assert!(window.contains(at("2024-01-31T23:59:59Z")));
        assert!(!window.contains(at("2024-02-01T00:00:00Z")));
        assert!(!window.contains(at("2023-12-31T23:59:59Z")));
    }

    #[test]
    fn month_window_handles_december_rollover() {
        let window = DateWindow::month(2024, 12).unwrap();
        assert!(window.contains(at("2024-12-31T12:00:00Z")));
        assert!(!window.contains(at("2025-01-01T00:00:00Z")));
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert!(DateWindow::month(2024, 0).is_none());
        assert!(DateWindow::month(2024, 13).is_none());
    }

    #[test]
    fn daily_window_covers_the_whole_day() {
        let window = ReportingPeriod::Daily.window_containing(at("2024-03-15T14:30:00Z"));
        assert!(window.contains(at("2024-03-15T00:00:00Z")));
        assert!(window.contains(at("2024-03-15T23:59:59Z")));
        assert!(!window.contains(at("2024-03-16T00:00:00Z")));
    }

    #[test]
    fn weekly_window_runs_sunday_to_saturday() {
        // 2024-03-15 is a Friday; its week is Sun 03-10 .. Sat 03-16.
        let window = ReportingPeriod::Weekly.window_containing(at("2024-03-15T14:30:00Z"));
        assert!(window.contains(at("2024-03-10T00:00:00Z")));
        assert!(window.contains(at("2024-03-16T23:59:59Z")));
        assert!(!window.contains(at("2024-03-09T23:59:59Z")));
        assert!(!window.contains(at("2024-03-17T00:00:00Z")));
    }

    #[test]
    fn monthly_and_yearly_windows_contain_their_instant() {
        let now = at("2024-02-29T08:00:00Z");
        let month = ReportingPeriod::Monthly.window_containing(now);
        assert!(month.contains(at("2024-02-01T00:00:00Z")));
        assert!(month.contains(at("2024-02-29T23:59:59Z")));
        assert!(!month.contains(at("2024-03-01T00:00:00Z")));

        let year = ReportingPeriod::Yearly.window_containing(now);
        assert!(year.contains(at("2024-01-01T00:00:00Z")));
        assert!(year.contains(at("2024-12-31T23:59:59Z")));
        assert!(!year.contains(at("2025-01-01T00:00:00Z")));
    }
}
