//! Calendar month helpers.
//!
//! Months are represented by the `NaiveDate` of their first day, which is
//! also how monthly feeds are keyed once normalised.

use crate::error::{DataError, Result};
use chrono::{Datelike, Duration, Months, NaiveDate};

/// First day of the calendar month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// Shift a month-start date by `months` calendar months (negative goes back).
///
/// Returns `None` if the result falls outside chrono's supported range.
pub fn shift_months(month: NaiveDate, months: i32) -> Option<NaiveDate> {
    let start = month_start(month);
    let delta = Months::new(months.unsigned_abs());
    if months >= 0 {
        start.checked_add_months(delta)
    } else {
        start.checked_sub_months(delta)
    }
}

/// Whether two dates fall in the same calendar month.
pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Parse a feed date.
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD` and `YYYY-MM` (read as the first of the
/// month).
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y%m%d") {
        return Ok(date);
    }
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .map_err(|_| DataError::InvalidDate(raw.to_string()))
}

/// Serde adapter for feed dates in any of the formats [`parse_date`] accepts.
pub mod feed_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    /// Serialize as `YYYY-MM-DD`.
    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format("%Y-%m-%d"))
    }

    /// Deserialize from any supported feed format.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(D::Error::custom)
    }
}
