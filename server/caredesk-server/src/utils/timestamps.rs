//! Timestamp utilities for consistent timestamp handling across the codebase
//!
//! Stored timestamps are RFC 3339 strings in UTC with microsecond precision,
//! so their text order matches their time order. Calendar dates such as
//! `dateOfBirth` stay plain `YYYY-MM-DD` strings.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

use crate::error::ApiError;

/// Current instant in the stored timestamp format
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

pub fn to_rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp, `None` when absent or malformed
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse date string in YYYY-MM-DD format
pub fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::validation("Invalid date format. Expected format: YYYY-MM-DD"))
}

/// Whole years between `birth` and `on`; zero for future birth dates.
pub fn age_on(birth: NaiveDate, on: NaiveDate) -> u32 {
    if birth > on {
        return 0;
    }
    let mut years = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Age today for a `YYYY-MM-DD` birth date.
pub fn age_from_birth_date(value: &str) -> Option<u32> {
    parse_date(value)
        .ok()
        .map(|birth| age_on(birth, Utc::now().date_naive()))
}
