/// Calendar date and time-of-day helpers.
///
/// Stored dates are plain `YYYY-MM-DD` calendar dates with no time zone
/// attached. All comparisons here work on (year, month, day) directly so a
/// viewer's local offset can never shift an appointment onto another day.
/// "Now" always comes from an injected [`Clock`] pinned to the clinic's
/// reference time zone.

use crate::error::{AgendaError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// A date with no time-of-day or zone component.
pub type CalendarDate = NaiveDate;

/// Reference zone used when nothing else is configured.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Parse a stored `YYYY-MM-DD` date.
///
/// Month and day may omit the leading zero and the year may carry a leading
/// `-`; anything that is not three numeric components forming a real date is
/// rejected.
pub fn parse_date(text: &str) -> Result<CalendarDate> {
    let malformed = || AgendaError::MalformedDate(text.to_string());
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let parts: Vec<&str> = unsigned.split('-').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return Err(malformed());
    }

    let year: i32 = parts[0].parse().map_err(|_| malformed())?;
    let year = if negative { -year } else { year };
    let month: u32 = parts[1].parse().map_err(|_| malformed())?;
    let day: u32 = parts[2].parse().map_err(|_| malformed())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)
}

/// Format a date for storage. Inverse of [`parse_date`].
pub fn format_for_storage(date: CalendarDate) -> String {
    let year = date.year();
    let sign = if year < 0 { "-" } else { "" };
    format!("{}{:04}-{:02}-{:02}", sign, year.unsigned_abs(), date.month(), date.day())
}

pub fn is_same_calendar_day(a: CalendarDate, b: CalendarDate) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// Sunday on or before `date`.
pub fn start_of_week(date: CalendarDate) -> CalendarDate {
    let offset = date.weekday().num_days_from_sunday() as i64;
    date - Duration::days(offset)
}

/// Saturday on or after `date`.
pub fn end_of_week(date: CalendarDate) -> CalendarDate {
    start_of_week(date) + Duration::days(6)
}

/// The seven consecutive dates of the Sunday-first week containing `date`.
pub fn week_dates(date: CalendarDate) -> [CalendarDate; 7] {
    let start = start_of_week(date);
    let mut days = [start; 7];
    for (offset, day) in days.iter_mut().enumerate() {
        *day = start + Duration::days(offset as i64);
    }
    days
}

pub fn is_today(date: CalendarDate, clock: &dyn Clock) -> bool {
    is_same_calendar_day(date, clock.today())
}

/// Parse a stored time of day, `HH:MM` or `HH:MM:SS`.
pub fn parse_time(text: &str) -> Result<NaiveTime> {
    let trimmed = text.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| AgendaError::MalformedTime(text.to_string()))
}

/// `HH:MM` label used by slot cells. Seconds are dropped.
pub fn format_time_label(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Time of day for a minute offset; `None` at or past midnight.
pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Source of "now" in the clinic's reference time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    fn today(&self) -> CalendarDate {
        self.now().date_naive()
    }

    fn timezone(&self) -> Tz {
        self.now().timezone()
    }
}

/// Wall clock rendered in a fixed zone, independent of the host's zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        SystemClock { tz }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new(DEFAULT_TIMEZONE)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<Tz>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Tz>) -> Self {
        FixedClock { instant }
    }

    /// Clock reading `date` at `time` in `tz`. Falls back to the earliest
    /// valid reading when the local time is ambiguous or skipped.
    pub fn at(tz: Tz, date: CalendarDate, time: NaiveTime) -> Self {
        FixedClock::new(local_instant(tz, date, time))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.instant
    }
}

/// Resolve a wall-clock reading in `tz` to an instant.
///
/// Daylight-saving gaps are bridged by moving forward an hour.
pub fn local_instant(tz: Tz, date: CalendarDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
