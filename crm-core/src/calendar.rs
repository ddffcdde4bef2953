use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{CrmError, CrmResult};

/// Half-open time window `[start, end)`. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub const UNBOUNDED: DateWindow = DateWindow {
        start: None,
        end: None,
    };

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| instant >= s) && self.end.map_or(true, |e| instant < e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Which side of a filter range a user-supplied date is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Start,
    End,
}

/// Day, week, month and year boundaries in the business timezone.
///
/// All "today" logic in the crate goes through here so that the host
/// timezone never leaks into task expiry or report windows.
#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar {
    tz: Tz,
}

impl BusinessCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Calendar date of `instant` as seen in the business timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// (year, month) of `instant` in the business timezone.
    pub fn year_month(&self, instant: DateTime<Utc>) -> (i32, u32) {
        let local = instant.with_timezone(&self.tz);
        (local.year(), local.month())
    }

    fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        // A local time inside a DST gap has no mapping; fall back to UTC.
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc())
    }

    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        self.localize(date.and_time(NaiveTime::MIN))
    }

    /// Last representable millisecond of `date` (23:59:59.999 local).
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        self.day_window(date)
            .end
            .map(|next| next - Duration::milliseconds(1))
            .unwrap_or_else(|| self.start_of_day(date))
    }

    pub fn at_time(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.localize(date.and_time(time))
    }

    pub fn day_window(&self, date: NaiveDate) -> DateWindow {
        let start = self.start_of_day(date);
        let end = date
            .succ_opt()
            .map(|next| self.start_of_day(next))
            .unwrap_or(start + Duration::days(1));
        DateWindow::between(start, end)
    }

    pub fn today(&self, now: DateTime<Utc>) -> DateWindow {
        self.day_window(self.local_date(now))
    }

    /// Start of the current week. Weeks begin on Sunday.
    pub fn start_of_week(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let offset = today.weekday().num_days_from_sunday() as i64;
        self.start_of_day(today - Duration::days(offset))
    }

    pub fn start_of_month(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        self.start_of_day(today.with_day(1).unwrap_or(today))
    }

    /// `[1st of month 00:00, 1st of next month 00:00)`.
    pub fn month_window(&self, year: i32, month: u32) -> CrmResult<DateWindow> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| CrmError::validation(format!("Invalid month: {}-{}", year, month)))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| CrmError::validation(format!("Invalid month: {}-{}", year, month)))?;

        Ok(DateWindow::between(
            self.start_of_day(first),
            self.start_of_day(next),
        ))
    }

    /// `[Jan 1 00:00, next Jan 1 00:00)`.
    pub fn year_window(&self, year: i32) -> CrmResult<DateWindow> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| CrmError::validation(format!("Invalid year: {}", year)))?;
        let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .ok_or_else(|| CrmError::validation(format!("Invalid year: {}", year)))?;
        Ok(DateWindow::between(
            self.start_of_day(first),
            self.start_of_day(next),
        ))
    }

    /// Resolves the reporting window for an optional year and month.
    ///
    /// A month without a year is ignored.
    pub fn period_window(&self, year: Option<i32>, month: Option<u32>) -> CrmResult<DateWindow> {
        match (year, month) {
            (Some(year), Some(month)) => self.month_window(year, month),
            (Some(year), None) => self.year_window(year),
            (None, _) => Ok(DateWindow::UNBOUNDED),
        }
    }

    /// Parses a `startDate`/`endDate` query value.
    ///
    /// Both bounds are inclusive for the caller. For [`RangeBound::End`] the
    /// returned value is the exclusive end of a half-open window:
    ///
    /// - an RFC 3339 instant is moved one microsecond later, the resolution
    ///   of a Postgres timestamp, so a record stamped exactly at `endDate`
    ///   is kept;
    /// - a plain `YYYY-MM-DD` date maps to the start of the following day,
    ///   so the whole end day is kept.
    ///
    /// Start bounds are the instant itself or the start of that day.
    pub fn parse_bound(&self, raw: &str, bound: RangeBound) -> CrmResult<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            let instant = instant.with_timezone(&Utc);
            return Ok(match bound {
                RangeBound::Start => instant,
                RangeBound::End => instant + Duration::microseconds(1),
            });
        }

        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| CrmError::validation(format!("Invalid date: {}", raw)))?;

        Ok(match bound {
            RangeBound::Start => self.start_of_day(date),
            RangeBound::End => self
                .day_window(date)
                .end
                .unwrap_or_else(|| self.start_of_day(date)),
        })
    }

    /// Builds a filter window from optional `startDate`/`endDate` strings.
    pub fn range(&self, start: Option<&str>, end: Option<&str>) -> CrmResult<DateWindow> {
        let start = start
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.parse_bound(s, RangeBound::Start))
            .transpose()?;
        let end = end
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.parse_bound(s, RangeBound::End))
            .transpose()?;
        Ok(DateWindow { start, end })
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Kolkata)
    }
}
