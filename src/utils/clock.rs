//! Time-of-day helpers shared by channel deadlines and the manager digest.
//!
//! All times are UTC. A "day window" is the half-open interval
//! `[00:00, 00:00 + 24h)` of the UTC day containing a given instant.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

const CLOCK_FORMAT: &str = "%H:%M";

/// Parses an `HH:MM` time of day.
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), CLOCK_FORMAT).ok()
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format(CLOCK_FORMAT).to_string()
}

/// True when `now` falls inside the same hour and minute as `time`.
pub fn is_same_minute(time: NaiveTime, now: DateTime<Utc>) -> bool {
    time.hour() == now.hour() && time.minute() == now.minute()
}

pub fn day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    (start, start + Duration::hours(24))
}

pub fn day_of(timestamp: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|t| t.date_naive())
}
