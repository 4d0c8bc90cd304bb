//! Trading calendar: which dates are sessions and when they open and close.
//!
//! Weekday-based. Exchange holidays are not modelled — a bundle that needs
//! them supplies its own session data through the ingest routine.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Session schedule a bundle is registered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    name: String,
    open: NaiveTime,
    close: NaiveTime,
    weekends: bool,
}

impl TradingCalendar {
    /// NYSE-shaped default: Monday–Friday, 09:30–16:00 (390 minutes).
    pub fn nyse() -> Self {
        Self {
            name: "NYSE".to_string(),
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            weekends: false,
        }
    }

    /// Every day is a session, midnight to midnight. For 24×7 sources.
    pub fn around_the_clock() -> Self {
        Self {
            name: "24x7".to_string(),
            open: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            weekends: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        self.weekends
            || !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// All sessions in `[start, end]`, oldest first.
    pub fn sessions_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut sessions = Vec::new();
        let mut current = start;
        while current <= end {
            if self.is_session(current) {
                sessions.push(current);
            }
            current += Duration::days(1);
        }
        sessions
    }

    pub fn session_open(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.open)
    }

    pub fn session_close(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.close)
    }

    /// Number of whole minutes in one regular session.
    pub fn minutes_per_session(&self) -> u32 {
        (self.close - self.open).num_minutes() as u32
    }
}
