//! Date defaults and time-block normalization. All values are local wall
//! clock; the caller supplies "now".

use chrono::{DateTime, Duration, Local, Months, NaiveDate, NaiveDateTime, Timelike};

const LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a canonical `YYYY-MM-DD HH:MM` local time, falling back to ISO
/// forms. Offset-carrying ISO strings are converted to local time.
pub fn parse_local_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|parsed| parsed.with_timezone(&Local).naive_local())
        })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| parse_local_datetime(raw).map(|datetime| datetime.date()))
}

/// `today + months`, saturating to a day-count approximation at the end of
/// the calendar.
pub fn months_from(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_add_months(Months::new(months))
        .unwrap_or_else(|| today + Duration::days(i64::from(months) * 30))
}

/// Top of the hour after `now`.
pub fn next_full_hour(now: NaiveDateTime) -> NaiveDateTime {
    let floored = now
        .with_minute(0)
        .and_then(|value| value.with_second(0))
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(now);
    floored + Duration::hours(1)
}

/// Resolve a time block's start and end so that `end > start` and the start
/// is not in the past.
///
/// - Missing start: next full hour.
/// - Missing or non-positive end: one hour after start.
/// - Start earlier today: same time tomorrow.
/// - Start on an earlier day: next full hour.
///
/// The block's duration is preserved when the start moves.
pub fn resolve_time_block(
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> (NaiveDateTime, NaiveDateTime) {
    let requested_start = start.unwrap_or_else(|| next_full_hour(now));
    let duration = match end {
        Some(end) if end > requested_start => end - requested_start,
        _ => Duration::hours(1),
    };

    let start = if requested_start >= now {
        requested_start
    } else if requested_start.date() == now.date() {
        requested_start + Duration::days(1)
    } else {
        next_full_hour(now)
    };

    (start, start + duration)
}
