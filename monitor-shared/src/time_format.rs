//! Date and time-of-day encodings used in backend query parameters.
//!
//! Dates are ISO `yyyy-MM-dd`; times of day are `HH-MM-SS`, zero padded,
//! 24 hour. Both are computed from calendar fields, never from locale
//! formatting.

use chrono::{NaiveDate, NaiveTime, ParseError, Timelike};

use crate::types::MINUTES_PER_DAY;

/// Format a minute-of-day as the backend's `HH-MM-SS` time parameter.
///
/// Samples are minute granular so seconds are always `00`.
pub fn time_param(minute: u16) -> String {
    let total_seconds = u32::from(minute % MINUTES_PER_DAY) * 60;
    let hours = total_seconds / 3600;
    let remainder = total_seconds % 3600;
    let minutes = remainder / 60;
    let seconds = remainder % 60;
    format!("{hours:02}-{minutes:02}-{seconds:02}")
}

/// Format a calendar date as `yyyy-MM-dd`.
pub fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a `yyyy-MM-dd` date.
pub fn parse_date_param(value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
}

/// Minutes since midnight for a wall-clock time.
pub fn minute_of_day(time: NaiveTime) -> u16 {
    (time.hour() * 60 + time.minute()) as u16
}

/// `HH:MM` label for chart axes and tooltips.
pub fn chart_label(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}
